//! Editing policy passed explicitly into container operations.

use crate::error::BrresError;

/// Policy for references that resolve to no known name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownRefPolicy {
    /// Leave the reference alone and report it.
    Report,
    /// Rename to the closest matching known name.
    Rename,
    /// Remove the referring item.
    Remove,
}

/// All recognized options with their defaults. Front ends set these from
/// string key/value pairs via [Config::set].
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Log verbosity 0..5. The library only distinguishes 0 (quiet).
    pub loudness: u8,
    pub case_sensitive: bool,
    pub partial_matching: bool,
    pub regex_matching: bool,
    /// Force sub-files to a specific version when packing, if supported.
    pub force_version: Option<u32>,
    pub remove_unused_textures: bool,
    pub minfilter_auto: bool,
    pub unknown_refs: UnknownRefPolicy,
    pub remove_unused_layers: bool,
    pub draw_pass_auto: bool,
    pub map_id_auto: bool,
    pub resize_pow_two: bool,
    pub max_image_size: u32,
    pub img_resample: String,
    pub material_library: Option<String>,
    pub detect_model_name: bool,
    pub default_material_color: [u8; 4],
    /// Maximum number of simultaneously open containers in the registry.
    pub max_open: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loudness: 3,
            case_sensitive: false,
            partial_matching: false,
            regex_matching: false,
            force_version: None,
            remove_unused_textures: false,
            minfilter_auto: false,
            unknown_refs: UnknownRefPolicy::Report,
            remove_unused_layers: false,
            draw_pass_auto: false,
            map_id_auto: false,
            resize_pow_two: false,
            max_image_size: 0,
            img_resample: "bicubic".to_string(),
            material_library: None,
            detect_model_name: false,
            default_material_color: [0x80, 0x80, 0x80, 0xff],
            max_open: 6,
        }
    }
}

fn parse_color(value: &str) -> Result<[u8; 4], BrresError> {
    let mut color = [0, 0, 0, 0xff];
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() < 3 || parts.len() > 4 {
        return Err(BrresError::Convert(format!(
            "expected r,g,b[,a], found {:?}",
            value
        )));
    }
    for (slot, part) in color.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| BrresError::Convert(format!("bad color component {:?}", part)))?;
    }
    Ok(color)
}

fn parse_bool(value: &str) -> Result<bool, BrresError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(BrresError::Convert(format!(
            "expected a boolean, found {:?}",
            value
        ))),
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a string option as a front end or configuration file would.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), BrresError> {
        match key {
            "loudness" => {
                self.loudness = value
                    .parse()
                    .map_err(|_| BrresError::Convert(format!("bad loudness {:?}", value)))?
            }
            "case_sensitive" => self.case_sensitive = parse_bool(value)?,
            "partial_matching" => self.partial_matching = parse_bool(value)?,
            "regex_matching" => self.regex_matching = parse_bool(value)?,
            "force_version" => {
                self.force_version = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|_| {
                        BrresError::Convert(format!("bad version {:?}", value))
                    })?)
                }
            }
            "remove_unused_textures" => self.remove_unused_textures = parse_bool(value)?,
            "minfilter_auto" => self.minfilter_auto = parse_bool(value)?,
            "rename_unknown_refs" => {
                if parse_bool(value)? {
                    self.unknown_refs = UnknownRefPolicy::Rename;
                }
            }
            "remove_unknown_refs" => {
                if parse_bool(value)? {
                    self.unknown_refs = UnknownRefPolicy::Remove;
                }
            }
            "remove_unused_layers" => self.remove_unused_layers = parse_bool(value)?,
            "draw_pass_auto" => self.draw_pass_auto = parse_bool(value)?,
            "map_id_auto" => self.map_id_auto = parse_bool(value)?,
            "resize_pow_two" => self.resize_pow_two = parse_bool(value)?,
            "max_image_size" => {
                self.max_image_size = value
                    .parse()
                    .map_err(|_| BrresError::Convert(format!("bad image size {:?}", value)))?
            }
            "img_resample" => self.img_resample = value.to_string(),
            "material_library" => {
                self.material_library = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "detect_model_name" => self.detect_model_name = parse_bool(value)?,
            "default_material_color" => self.default_material_color = parse_color(value)?,
            "max_open" => {
                self.max_open = value
                    .parse()
                    .map_err(|_| BrresError::Convert(format!("bad max_open {:?}", value)))?
            }
            _ => {
                return Err(BrresError::UnknownName(key.to_string()));
            }
        }
        Ok(())
    }

    /// Reads an option back as a string, for front ends echoing settings.
    /// Returns None for unrecognized keys.
    pub fn get(&self, key: &str) -> Option<String> {
        Some(match key {
            "loudness" => self.loudness.to_string(),
            "case_sensitive" => self.case_sensitive.to_string(),
            "partial_matching" => self.partial_matching.to_string(),
            "regex_matching" => self.regex_matching.to_string(),
            "force_version" => match self.force_version {
                Some(v) => v.to_string(),
                None => String::new(),
            },
            "remove_unused_textures" => self.remove_unused_textures.to_string(),
            "minfilter_auto" => self.minfilter_auto.to_string(),
            "rename_unknown_refs" => (self.unknown_refs == UnknownRefPolicy::Rename).to_string(),
            "remove_unknown_refs" => (self.unknown_refs == UnknownRefPolicy::Remove).to_string(),
            "remove_unused_layers" => self.remove_unused_layers.to_string(),
            "draw_pass_auto" => self.draw_pass_auto.to_string(),
            "map_id_auto" => self.map_id_auto.to_string(),
            "resize_pow_two" => self.resize_pow_two.to_string(),
            "max_image_size" => self.max_image_size.to_string(),
            "img_resample" => self.img_resample.clone(),
            "material_library" => self.material_library.clone().unwrap_or_default(),
            "detect_model_name" => self.detect_model_name.to_string(),
            "default_material_color" => {
                let [r, g, b, a] = self.default_material_color;
                format!("{},{},{},{}", r, g, b, a)
            }
            "max_open" => self.max_open.to_string(),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_recognized_keys() {
        let mut config = Config::new();
        config.set("remove_unused_textures", "true").unwrap();
        config.set("loudness", "5").unwrap();
        config.set("rename_unknown_refs", "on").unwrap();
        assert!(config.remove_unused_textures);
        assert_eq!(config.loudness, 5);
        assert_eq!(config.unknown_refs, UnknownRefPolicy::Rename);
    }

    #[test]
    fn get_reads_options_back() {
        let mut config = Config::new();
        config.set("loudness", "5").unwrap();
        config.set("remove_unknown_refs", "yes").unwrap();
        assert_eq!(config.get("loudness"), Some("5".to_string()));
        assert_eq!(config.get("remove_unknown_refs"), Some("true".to_string()));
        assert_eq!(config.get("rename_unknown_refs"), Some("false".to_string()));
        assert_eq!(config.get("force_version"), Some(String::new()));
        assert_eq!(config.get("not_a_key"), None);
    }

    #[test]
    fn default_material_color_parses_components() {
        let mut config = Config::new();
        config.set("default_material_color", "16, 32, 48").unwrap();
        assert_eq!(config.default_material_color, [16, 32, 48, 0xff]);
        config.set("default_material_color", "1,2,3,4").unwrap();
        assert_eq!(
            config.get("default_material_color"),
            Some("1,2,3,4".to_string())
        );
        assert!(config.set("default_material_color", "1,2").is_err());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut config = Config::new();
        assert!(matches!(
            config.set("not_a_key", "1"),
            Err(BrresError::UnknownName(_))
        ));
    }
}

use crate::config::AppConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    width: Option<u32>,
    height: Option<u32>,
    vsync: Option<bool>,
    step: Option<i32>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // program name
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Use --width/--height/--vsync/--step with values.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "vsync" => {
                    overrides.vsync = Some(parse_bool_flag("vsync", &value)?);
                }
                "step" => {
                    overrides.step =
                        Some(value.parse::<i32>().with_context(|| format!("Invalid step '{value}'"))?);
                }
                _ => bail!("Unknown flag '{flag}'. Supported flags: --width, --height, --vsync, --step."),
            }
        }
        Ok(overrides)
    }

    pub fn into_config_overrides(self) -> AppConfigOverrides {
        AppConfigOverrides {
            width: self.width,
            height: self.height,
            vsync: self.vsync,
            start_step: self.step,
        }
    }

    #[cfg(test)]
    pub fn as_tuple(&self) -> (Option<u32>, Option<u32>, Option<bool>, Option<i32>) {
        (self.width, self.height, self.vsync, self.step)
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_window_flags() {
        let args = ["dither_howto", "--width", "1600", "--height", "900", "--vsync", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.as_tuple(), (Some(1600), Some(900), Some(false), None));
    }

    #[test]
    fn parses_start_step_including_negative() {
        let overrides = CliOverrides::parse(["dither_howto", "--step", "10"]).expect("parse");
        assert_eq!(overrides.as_tuple().3, Some(10));
        let overrides = CliOverrides::parse(["dither_howto", "--step", "-3"]).expect("parse");
        assert_eq!(overrides.into_config_overrides().start_step, Some(-3));
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["dither_howto", "--width", "800", "--width", "1920", "--vsync", "on", "--vsync", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.as_tuple(), (Some(1920), None, Some(false), None));
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["dither_howto", "--step"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        let err = CliOverrides::parse(["dither_howto", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"));
        let err = CliOverrides::parse(["dither_howto", "--step", "two"]).unwrap_err();
        assert!(err.to_string().contains("Invalid step"));
        let err = CliOverrides::parse(["dither_howto", "positional"]).unwrap_err();
        assert!(err.to_string().contains("Unexpected argument"));
    }
}

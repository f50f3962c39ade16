//! `wall` section of the configuration: the physical arrangement of screens.

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

fn default_one() -> usize {
    1
}

/// Physical wall description as written in `config.yaml`.
///
/// ```yaml
/// wall:
///   width: 20      # optional, derived from the screens when absent
///   height: 10
///   rows: 1
///   columns: 2
///   tvs:
///     - { tv_id: piwall1.local_1, x: 0, y: 0, width: 10, height: 10 }
///     - { tv_id: piwall2.local_1, x: 10, y: 0, width: 10, height: 10 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WallSection {
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default = "default_one")]
    pub rows: usize,
    #[serde(default = "default_one")]
    pub columns: usize,
    #[serde(default)]
    pub tvs: Vec<TvSection>,
}

/// One screen, in the same physical units as the wall.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TvSection {
    #[serde(deserialize_with = "string_or_number")]
    pub tv_id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub hostname: Option<String>,
}

// Les identifiants peuvent être écrits `1` ou `"piwall.local_1"`
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "tv_id must be a string or a number, got {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults() {
        let section: WallSection = serde_yaml::from_str(
            "tvs:\n  - {tv_id: a_1, x: 0, y: 0.5, width: 11, height: 8.25, hostname: a}\n",
        )
        .unwrap();
        assert_eq!(section.width, None);
        assert_eq!(section.rows, 1);
        assert_eq!(section.columns, 1);
        assert_eq!(section.tvs[0].tv_id, "a_1");
        assert_eq!(section.tvs[0].hostname.as_deref(), Some("a"));
        assert_eq!(section.tvs[0].y, 0.5);
    }

    #[test]
    fn test_numeric_ids() {
        let section: WallSection =
            serde_yaml::from_str("tvs:\n  - {tv_id: 7, x: 0, y: 0, width: 1, height: 1}\n").unwrap();
        assert_eq!(section.tvs[0].tv_id, "7");
    }

    #[test]
    fn test_rejects_structured_ids() {
        let result: Result<WallSection, _> =
            serde_yaml::from_str("tvs:\n  - {tv_id: [1], x: 0, y: 0, width: 1, height: 1}\n");
        assert!(result.is_err());
    }
}

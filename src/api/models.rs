use std::fmt;
use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serialize};

/// A downloadable chart as returned by the catalog search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(default, alias = "chartId", deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub charter: String,
    /// md5 digest of the chart package, used as the download key.
    #[serde(default, alias = "md5")]
    pub content_hash: String,
}

impl CatalogEntry {
    pub fn digest(&self) -> Option<&str> {
        let hash = self.content_hash.trim();
        (!hash.is_empty()).then_some(hash)
    }
}

fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlexibleIdVisitor;

    impl<'de> de::Visitor<'de> for FlexibleIdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number or a string id")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(FlexibleIdVisitor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Guitar,
    GuitarCoop,
    Rhythm,
    Bass,
    Drums,
    Keys,
}

impl Instrument {
    pub const ALL: [Instrument; 6] = [
        Instrument::Guitar,
        Instrument::GuitarCoop,
        Instrument::Rhythm,
        Instrument::Bass,
        Instrument::Drums,
        Instrument::Keys,
    ];
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Instrument::Guitar => "Guitar",
            Instrument::GuitarCoop => "Guitar (Co-op)",
            Instrument::Rhythm => "Rhythm",
            Instrument::Bass => "Bass",
            Instrument::Drums => "Drums",
            Instrument::Keys => "Keys",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Expert,
    Hard,
    Medium,
    Easy,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Expert,
        Difficulty::Hard,
        Difficulty::Medium,
        Difficulty::Easy,
    ];
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Expert => "Expert",
            Difficulty::Hard => "Hard",
            Difficulty::Medium => "Medium",
            Difficulty::Easy => "Easy",
        };
        f.write_str(name)
    }
}

/// Body of a catalog search call. Unset filters go out as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchQuery {
    pub search: String,
    pub page: u32,
    pub instrument: Option<Instrument>,
    pub difficulty: Option<Difficulty>,
}

impl SearchQuery {
    pub fn new(search: impl Into<String>, page: u32) -> Self {
        Self {
            search: search.into(),
            page: page.max(1),
            instrument: None,
            difficulty: None,
        }
    }

    pub fn with_filters(
        mut self,
        instrument: Option<Instrument>,
        difficulty: Option<Difficulty>,
    ) -> Self {
        self.instrument = instrument;
        self.difficulty = difficulty;
        self
    }
}

/// Response from the search endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub found: u64,
    #[serde(default)]
    pub data: Vec<CatalogEntry>,
}

/// Endpoints and pacing of the chart site
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub origin: String,
    pub search_endpoint: String,
    /// Gated archive endpoint, takes `md5`, `isSng` and `filename` query params.
    pub download_endpoint: String,
    /// Static file host, serves `<md5>.<ext>`.
    pub files_endpoint: String,
    pub single_file_extension: String,
    pub user_agent: String,
    pub bootstrap_initial_delay: Duration,
    pub bootstrap_probe_delay: Duration,
    pub bootstrap_query: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "https://www.enchor.us".to_string(),
            search_endpoint: "https://api.enchor.us/search".to_string(),
            download_endpoint: "https://www.enchor.us/download".to_string(),
            files_endpoint: "https://files.enchor.us".to_string(),
            single_file_extension: "sng".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            bootstrap_initial_delay: Duration::from_secs(2),
            bootstrap_probe_delay: Duration::from_secs(1),
            bootstrap_query: "the".to_string(),
        }
    }
}

impl SiteConfig {
    /// Same site, every endpoint rooted at `origin`. Used for mirrors and local servers.
    pub fn for_origin(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/').to_string();
        Self {
            search_endpoint: format!("{}/search", origin),
            download_endpoint: format!("{}/download", origin),
            files_endpoint: format!("{}/files", origin),
            origin,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_decodes_site_field_names() {
        let json = r#"{"chartId": 4821, "name": "Baz", "artist": "Foo", "charter": "Me", "md5": "abc123", "songLength": 1000}"#;
        let entry: CatalogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "4821");
        assert_eq!(entry.title, "Baz");
        assert_eq!(entry.digest(), Some("abc123"));
    }

    #[test]
    fn blank_digest_is_missing() {
        let entry = CatalogEntry {
            content_hash: "  ".into(),
            ..Default::default()
        };
        assert_eq!(entry.digest(), None);
    }

    #[test]
    fn origin_override_roots_every_endpoint() {
        let config = SiteConfig::for_origin("http://127.0.0.1:8080/");
        assert_eq!(config.origin, "http://127.0.0.1:8080");
        assert_eq!(config.search_endpoint, "http://127.0.0.1:8080/search");
        assert_eq!(config.files_endpoint, "http://127.0.0.1:8080/files");
    }

    #[test]
    fn filters_serialize_as_site_names() {
        let body = serde_json::to_value(
            SearchQuery::new("through the fire", 0)
                .with_filters(Some(Instrument::GuitarCoop), Some(Difficulty::Expert)),
        )
        .unwrap();
        assert_eq!(body["page"], 1);
        assert_eq!(body["instrument"], "guitarcoop");
        assert_eq!(body["difficulty"], "expert");

        let unfiltered = serde_json::to_value(SearchQuery::new("x", 2)).unwrap();
        assert!(unfiltered["instrument"].is_null());
        assert!(unfiltered["difficulty"].is_null());
    }
}

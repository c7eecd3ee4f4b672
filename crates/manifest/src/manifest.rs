//! Parsed manifest and per-game records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ManifestError;
use crate::literal::parse_python_literal;
use crate::urls::{abs_url, url_from_value};

/// Fields checked, in order, for a product id.
const PRODUCT_ID_KEYS: &[&str] = &["product_id", "productId", "productid", "id"];
/// Fields checked, in order, for a fallback cover.
const COVER_KEYS: &[&str] = &["bg_url", "image_url", "image", "logo"];
/// Fields checked, in order, for a fallback description.
const DESCRIPTION_KEYS: &[&str] = &["description", "summary"];

/// Entry of the game list shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    /// Slug gogrepo uses as the game's id.
    pub title: String,
    /// Display name; the slug when the manifest has none.
    pub long_title: String,
    pub product_id: Option<String>,
}

/// One game's raw manifest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord(Map<String, Value>);

impl GameRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Title slug, falling back to `slug`.
    pub fn title(&self) -> Option<&str> {
        self.str_field("title").or_else(|| self.str_field("slug"))
    }

    pub fn long_title(&self) -> Option<&str> {
        self.str_field("long_title")
    }

    /// GOG product id, accepting numbers or strings under any of the
    /// spellings gogrepo versions have used.
    pub fn product_id(&self) -> Option<String> {
        PRODUCT_ID_KEYS.iter().find_map(|key| match self.0.get(*key)? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
    }

    /// Absolute URL of the best cover-like image in the record.
    pub fn cover_url(&self) -> Option<String> {
        COVER_KEYS
            .iter()
            .filter_map(|key| self.0.get(*key))
            .find_map(url_from_value)
            .and_then(|url| abs_url(&url))
    }

    /// Description text, if the record carries one.
    pub fn description(&self) -> Option<String> {
        DESCRIPTION_KEYS.iter().find_map(|key| match self.0.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(obj) => obj
                .get("full")
                .or_else(|| obj.get("lead"))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            _ => None,
        })
    }

    pub fn summary(&self) -> Option<GameSummary> {
        let title = self.title()?.to_string();
        Some(GameSummary {
            long_title: self.long_title().unwrap_or(&title).to_string(),
            product_id: self.product_id(),
            title,
        })
    }
}

/// A loaded manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    records: Vec<GameRecord>,
}

impl Manifest {
    /// Parses manifest text, trying JSON first, then the Python literal
    /// gogrepo writes.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(json_err) => {
                debug!(error = %json_err, "manifest is not JSON, trying Python literal");
                parse_python_literal(text)?
            }
        };
        Ok(Self::from_value(value))
    }

    /// Extracts game records from any of the accepted top-level shapes:
    /// a list of games, `{"products": {...}}`, `{"games": [...] | {...}}`,
    /// or a dict whose dict values are games.
    pub fn from_value(value: Value) -> Self {
        let items: Vec<Value> = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match (map.remove("products"), map.remove("games")) {
                (Some(Value::Object(products)), _) => products.into_iter().map(|(_, v)| v).collect(),
                (_, Some(Value::Object(games))) => games.into_iter().map(|(_, v)| v).collect(),
                (_, Some(Value::Array(games))) => games,
                (_, Some(_)) => Vec::new(),
                (products, None) => map
                    .into_iter()
                    .map(|(_, v)| v)
                    .chain(products)
                    .filter(Value::is_object)
                    .collect(),
            },
            _ => Vec::new(),
        };
        let records = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(fields) => Some(GameRecord(fields)),
                _ => None,
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[GameRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record whose title slug equals `title` exactly.
    pub fn find(&self, title: &str) -> Option<&GameRecord> {
        let title = title.trim();
        self.records.iter().find(|r| r.str_field("title") == Some(title))
    }

    /// Game list, deduplicated by slug (case-insensitively) and sorted by
    /// display name.
    pub fn games(&self) -> Vec<GameSummary> {
        let mut seen = std::collections::HashSet::new();
        let mut games: Vec<GameSummary> = self
            .records
            .iter()
            .filter_map(GameRecord::summary)
            .filter(|g| seen.insert(g.title.to_lowercase()))
            .collect();
        games.sort_by_cached_key(|g| g.long_title.to_lowercase());
        games
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> GameRecord {
        match value {
            Value::Object(map) => GameRecord::new(map),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn parses_pprint_list() {
        let text = "[{'id': 1, 'long_title': 'Zeta', 'title': 'zeta'},\n {'id': 2, 'long_title': 'alpha', 'title': 'alpha'}]";
        let manifest = Manifest::parse(text).unwrap();
        let games = manifest.games();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].title, "alpha");
        assert_eq!(games[0].product_id.as_deref(), Some("2"));
        assert_eq!(games[1].long_title, "Zeta");
    }

    #[test]
    fn parses_json_products_dict() {
        let text = r#"{"products": {"a": {"title": "trine_2_complete_story", "productId": "1234"}}}"#;
        let manifest = Manifest::parse(text).unwrap();
        let rec = manifest.find("trine_2_complete_story").unwrap();
        assert_eq!(rec.product_id().as_deref(), Some("1234"));
    }

    #[test]
    fn games_key_as_list_or_dict() {
        let list = Manifest::from_value(json!({"games": [{"title": "a"}]}));
        assert_eq!(list.len(), 1);
        let dict = Manifest::from_value(json!({"games": {"x": {"title": "a"}, "y": {"title": "b"}}}));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn dict_of_games_skips_non_dicts() {
        let m = Manifest::from_value(json!({"version": 3, "one": {"title": "one"}}));
        assert_eq!(m.len(), 1);
        assert!(Manifest::from_value(json!("junk")).is_empty());
    }

    #[test]
    fn games_dedupe_and_fallbacks() {
        let m = Manifest::from_value(json!([
            {"title": "Foo", "long_title": "Foo Game"},
            {"title": "foo", "long_title": "Duplicate"},
            {"slug": "bar"},
            {"long_title": "no slug"},
            {"title": "   "}
        ]));
        let games = m.games();
        let titles: Vec<_> = games.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(titles, ["bar", "Foo"]);
        assert_eq!(games[0].long_title, "bar");
        assert_eq!(games[0].product_id, None);
    }

    #[test]
    fn find_is_exact_on_title() {
        let m = Manifest::from_value(json!([{"title": "trine_2"}, {"slug": "other"}]));
        assert!(m.find("trine_2").is_some());
        assert!(m.find("TRINE_2").is_none());
        assert!(m.find("other").is_none());
    }

    #[test]
    fn product_id_spellings() {
        assert_eq!(record(json!({"id": 42})).product_id().as_deref(), Some("42"));
        assert_eq!(
            record(json!({"productid": " 7 ", "id": 1})).product_id().as_deref(),
            Some("7")
        );
        assert_eq!(record(json!({"product_id": ""})).product_id(), None);
    }

    #[test]
    fn cover_url_prefers_bg_url_and_normalizes() {
        let rec = record(json!({
            "bg_url": "//images.gog.com/bg.jpg",
            "image": "/upload/img.png"
        }));
        assert_eq!(rec.cover_url().as_deref(), Some("https://images.gog.com/bg.jpg"));

        let nested = record(json!({"logo": {"url": "images.gog.com/logo.png"}}));
        assert_eq!(
            nested.cover_url().as_deref(),
            Some("https://images.gog.com/logo.png")
        );
        assert_eq!(record(json!({"title": "x"})).cover_url(), None);
    }

    #[test]
    fn description_from_string_or_object() {
        assert_eq!(
            record(json!({"summary": "short"})).description().as_deref(),
            Some("short")
        );
        assert_eq!(
            record(json!({"description": {"full": "<p>long</p>"}}))
                .description()
                .as_deref(),
            Some("<p>long</p>")
        );
        assert_eq!(record(json!({"description": "  "})).description(), None);
    }
}

//! Bibliographic records: CSL-JSON items and legacy BibTeX entries.

use std::borrow::Cow;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix for ids synthesized for records that carry none.
pub const SYNTHETIC_ID_PREFIX: &str = "ITEM-";

/// One CSL-JSON input record: an arbitrary object with a distinguished `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CslItem(Map<String, Value>);

impl CslItem {
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the `id` is a non-blank string or a number, i.e. usable as
    /// a citation key.
    #[must_use]
    pub fn has_id(&self) -> bool {
        self.id_text().is_some_and(|id| !id.trim().is_empty())
    }

    /// The `id` rendered as citation-key text. Numeric ids are kept as
    /// decimal text; other JSON types yield `None`.
    #[must_use]
    pub fn id_text(&self) -> Option<String> {
        self.0.get("id").and_then(scalar_text)
    }

    /// String value of `key`, also accepting numbers.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .and_then(scalar_text)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert("id".to_owned(), Value::String(id.into()));
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Synthetic id for the record at 1-based `position`.
#[must_use]
pub fn synthetic_id(position: usize) -> String {
    format!("{SYNTHETIC_ID_PREFIX}{position}")
}

/// Copy `items`, giving every record without a usable `id` the id `ITEM-<k>`
/// where `k` is its 1-based position. Null, blank, boolean, array and
/// object ids are replaced. Order is preserved.
#[must_use]
pub fn backfill_ids(items: &[CslItem]) -> Vec<CslItem> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let mut item = item.clone();
            if !item.has_id() {
                item.set_id(synthetic_id(idx + 1));
            }
            item
        })
        .collect()
}

/// Text form of a JSON string or number.
#[must_use]
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

// ── Legacy BibTeX entries ────────────────────────────────────────────────

/// BibTeX entry type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Article,
    Book,
    InCollection,
    InProceedings,
    PhdThesis,
    TechReport,
    Unpublished,
    Misc,
}

impl EntryType {
    /// Resolve a CSL `type` value; unmapped or missing types are `Misc`.
    #[must_use]
    pub fn from_csl_type(csl_type: Option<&str>) -> Self {
        match csl_type {
            Some("article" | "article-journal" | "article-magazine" | "article-newspaper") => {
                Self::Article
            }
            Some("book") => Self::Book,
            Some("chapter") => Self::InCollection,
            Some("paper-conference") => Self::InProceedings,
            Some("thesis") => Self::PhdThesis,
            Some("report") => Self::TechReport,
            Some("manuscript") => Self::Unpublished,
            _ => Self::Misc,
        }
    }

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Book => "book",
            Self::InCollection => "incollection",
            Self::InProceedings => "inproceedings",
            Self::PhdThesis => "phdthesis",
            Self::TechReport => "techreport",
            Self::Unpublished => "unpublished",
            Self::Misc => "misc",
        }
    }

    /// Articles carry their container title as `journal`, everything else as
    /// `booktitle`.
    #[must_use]
    pub const fn is_article(self) -> bool {
        matches!(self, Self::Article)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A flat legacy bibliographic entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    pub key: String,
    pub entry_type: EntryType,
    pub title: String,
    pub author: Vec<String>,
    pub editor: Vec<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub journal: Option<String>,
    pub booktitle: Option<String>,
    pub volume: Option<String>,
    pub number: Option<String>,
    pub pages: Option<String>,
    pub publisher: Option<String>,
    pub address: Option<String>,
    pub url: Option<String>,
    pub doi: Option<String>,
}

impl BibEntry {
    /// Convert a record whose id has already been backfilled.
    ///
    /// A missing title becomes `Item <id>`: the engine's BibTeX reader
    /// rejects entries without one.
    #[must_use]
    pub fn from_csl(item: &CslItem) -> Self {
        let key = item.id_text().unwrap_or_default();
        let entry_type = EntryType::from_csl_type(item.get("type").and_then(Value::as_str));
        let title = item
            .text("title")
            .unwrap_or_else(|| format!("Item {key}"));
        let (year, month) = issued_year_month(item.get("issued"));
        let container = item.text("container-title");
        let (journal, booktitle) = if entry_type.is_article() {
            (container, None)
        } else {
            (None, container)
        };

        Self {
            entry_type,
            title,
            author: format_names(item.get("author")),
            editor: format_names(item.get("editor")),
            year,
            month,
            journal,
            booktitle,
            volume: item.text("volume"),
            number: item.text("issue"),
            pages: item.text("page"),
            publisher: item.text("publisher"),
            address: item.text("publisher-place"),
            url: item.text("URL"),
            doi: item.text("DOI"),
            key,
        }
    }

    /// Serialize as one `@type{key, ...}` block.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(256);
        let _ = writeln!(out, "@{}{{{},", self.entry_type, self.key);
        push_field(&mut out, "title", Some(&self.title));
        if !self.author.is_empty() {
            push_field(&mut out, "author", Some(&self.author.join(" and ")));
        }
        if !self.editor.is_empty() {
            push_field(&mut out, "editor", Some(&self.editor.join(" and ")));
        }
        push_field(&mut out, "year", self.year.as_ref());
        push_field(&mut out, "month", self.month.as_ref());
        push_field(&mut out, "journal", self.journal.as_ref());
        push_field(&mut out, "booktitle", self.booktitle.as_ref());
        push_field(&mut out, "volume", self.volume.as_ref());
        push_field(&mut out, "number", self.number.as_ref());
        push_field(&mut out, "pages", self.pages.as_ref());
        push_field(&mut out, "publisher", self.publisher.as_ref());
        push_field(&mut out, "address", self.address.as_ref());
        push_field(&mut out, "url", self.url.as_ref());
        push_field(&mut out, "doi", self.doi.as_ref());
        out.push('}');
        out
    }
}

fn push_field(out: &mut String, name: &str, value: Option<&String>) {
    if let Some(value) = value {
        let _ = writeln!(out, "  {name} = {{{}}},", field_body(value));
    }
}

/// Body of a brace-delimited field. Balanced braces are kept since they
/// protect case; otherwise every unescaped brace is escaped so the value
/// cannot close its field early.
#[must_use]
pub fn field_body(value: &str) -> Cow<'_, str> {
    if braces_balanced(value) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    let mut escaped = false;
    for ch in value.chars() {
        if matches!(ch, '{' | '}') && !escaped {
            out.push('\\');
        }
        escaped = ch == '\\' && !escaped;
        out.push(ch);
    }
    // A trailing backslash would escape the closing delimiter.
    if escaped {
        out.push(' ');
    }
    Cow::Owned(out)
}

fn braces_balanced(value: &str) -> bool {
    let mut depth = 0_usize;
    let mut escaped = false;
    for ch in value.chars() {
        if !escaped {
            match ch {
                '{' => depth += 1,
                '}' => match depth.checked_sub(1) {
                    Some(next) => depth = next,
                    None => return false,
                },
                _ => {}
            }
        }
        escaped = ch == '\\' && !escaped;
    }
    depth == 0 && !escaped
}

/// Format a CSL name list into BibTeX name strings.
#[must_use]
pub fn format_names(names: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(names)) = names else {
        return Vec::new();
    };
    names
        .iter()
        .filter_map(Value::as_object)
        .filter_map(format_name)
        .collect()
}

/// Format a single CSL name object.
///
/// `literal` wins verbatim. Otherwise the family part is the particles plus
/// `family`; with a suffix the order is `family, suffix, given`, without it
/// `family, given`. A suffix is only emitted alongside a given name.
#[must_use]
pub fn format_name(name: &Map<String, Value>) -> Option<String> {
    let part = |key: &str| {
        name.get(key)
            .and_then(scalar_text)
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty())
    };

    if let Some(literal) = part("literal") {
        return Some(literal);
    }

    let family = part("family").map(|family| {
        let mut pieces: Vec<String> = ["dropping-particle", "non-dropping-particle"]
            .iter()
            .filter_map(|key| part(*key))
            .collect();
        pieces.push(family);
        pieces.join(" ")
    });
    let given = part("given");
    let suffix = part("suffix");

    match (family, given, suffix) {
        (Some(family), Some(given), Some(suffix)) => Some(format!("{family}, {suffix}, {given}")),
        (Some(family), Some(given), None) => Some(format!("{family}, {given}")),
        (Some(family), None, _) => Some(family),
        (None, Some(given), _) => Some(given),
        (None, None, _) => None,
    }
}

/// Year and month from `issued.date-parts[0]`. No day is extracted.
fn issued_year_month(issued: Option<&Value>) -> (Option<String>, Option<String>) {
    let first = issued
        .and_then(|issued| issued.get("date-parts"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(Value::as_array);
    let Some(first) = first else {
        return (None, None);
    };
    let component = |idx: usize| {
        first
            .get(idx)
            .and_then(scalar_text)
            .filter(|text| !text.trim().is_empty())
    };
    (component(0), component(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn item(value: Value) -> CslItem {
        serde_json::from_value(value).unwrap()
    }

    fn name(value: Value) -> Option<String> {
        format_name(value.as_object().unwrap())
    }

    #[test]
    fn test_backfill_preserves_existing_ids_and_order() {
        let items = vec![
            item(json!({"title": "A"})),
            item(json!({"id": "KEEP", "title": "B"})),
            item(json!({"title": "C"})),
        ];
        let filled = backfill_ids(&items);
        let ids: Vec<_> = filled.iter().map(|i| i.id_text().unwrap()).collect();
        assert_eq!(ids, ["ITEM-1", "KEEP", "ITEM-3"]);
        assert_eq!(filled[2].text("title").as_deref(), Some("C"));
    }

    #[test]
    fn test_numeric_id_is_kept() {
        let filled = backfill_ids(&[item(json!({"id": 7}))]);
        assert_eq!(filled[0].get("id"), Some(&json!(7)));
        assert_eq!(filled[0].id_text().as_deref(), Some("7"));
    }

    #[test]
    fn test_unusable_ids_are_backfilled() {
        let items = vec![
            item(json!({"id": null, "title": "A"})),
            item(json!({"id": {"x": 1}})),
            item(json!({"id": "  "})),
            item(json!({"id": ["a"]})),
            item(json!({"id": true})),
            item(json!({"id": "KEEP"})),
        ];
        let filled = backfill_ids(&items);
        let ids: Vec<_> = filled.iter().map(|i| i.id_text().unwrap()).collect();
        assert_eq!(ids, ["ITEM-1", "ITEM-2", "ITEM-3", "ITEM-4", "ITEM-5", "KEEP"]);
        assert_eq!(filled[0].text("title").as_deref(), Some("A"));
        assert_eq!(BibEntry::from_csl(&filled[1]).key, "ITEM-2");
    }

    #[test]
    fn test_field_braces_cannot_close_entry() {
        assert_eq!(field_body("The {DNA} Story"), "The {DNA} Story");
        assert_eq!(field_body("a } b"), "a \\} b");
        assert_eq!(field_body("x{y"), "x\\{y");
        assert_eq!(field_body("}{"), "\\}\\{");
        assert_eq!(field_body("half \\} {open"), "half \\} \\{open");
        assert_eq!(field_body("C:\\"), "C:\\ ");

        let entry = BibEntry::from_csl(&item(json!({
            "id": "B",
            "title": "Broken } title",
            "publisher": "Open { Press"
        })));
        let rendered = entry.render();
        assert!(rendered.contains("  title = {Broken \\} title},\n"));
        assert!(rendered.contains("  publisher = {Open \\{ Press},\n"));
        assert!(rendered.ends_with("\n}"));
        assert!(braces_balanced(&rendered.replace("\\{", "").replace("\\}", "")));
    }

    #[test]
    fn test_entry_type_table() {
        assert_eq!(EntryType::from_csl_type(Some("article-journal")), EntryType::Article);
        assert_eq!(EntryType::from_csl_type(Some("chapter")), EntryType::InCollection);
        assert_eq!(EntryType::from_csl_type(Some("thesis")), EntryType::PhdThesis);
        assert_eq!(EntryType::from_csl_type(Some("legal_case")), EntryType::Misc);
        assert_eq!(EntryType::from_csl_type(None), EntryType::Misc);
    }

    #[test]
    fn test_name_composition() {
        assert_eq!(name(json!({"literal": "ACME Corp."})).as_deref(), Some("ACME Corp."));
        assert_eq!(
            name(json!({"family": "Doe", "given": "John"})).as_deref(),
            Some("Doe, John")
        );
        assert_eq!(
            name(json!({"family": "Doe", "given": "John", "suffix": "Jr."})).as_deref(),
            Some("Doe, Jr., John")
        );
        assert_eq!(
            name(json!({"family": "Beethoven", "non-dropping-particle": "van", "given": "Ludwig"}))
                .as_deref(),
            Some("van Beethoven, Ludwig")
        );
        assert_eq!(name(json!({"family": "Plato"})).as_deref(), Some("Plato"));
        assert_eq!(name(json!({"given": "Madonna"})).as_deref(), Some("Madonna"));
        assert_eq!(name(json!({})), None);
    }

    #[test]
    fn test_names_joined_with_and() {
        let entry = BibEntry::from_csl(&item(json!({
            "id": "X",
            "title": "T",
            "author": [{"family": "Doe", "given": "J"}, {"literal": "Group"}]
        })));
        assert_eq!(entry.author, ["Doe, J", "Group"]);
        assert!(entry.render().contains("author = {Doe, J and Group},"));
    }

    #[test]
    fn test_missing_title_gets_placeholder() {
        let entry = BibEntry::from_csl(&item(json!({"id": "ITEM-2"})));
        assert_eq!(entry.title, "Item ITEM-2");
    }

    #[test]
    fn test_date_parts_year_and_month() {
        let entry = BibEntry::from_csl(&item(json!({
            "id": "X",
            "issued": {"date-parts": [["1999", 4, 12]]}
        })));
        assert_eq!(entry.year.as_deref(), Some("1999"));
        assert_eq!(entry.month.as_deref(), Some("4"));

        let year_only = BibEntry::from_csl(&item(json!({
            "id": "Y",
            "issued": {"date-parts": [[2001]]}
        })));
        assert_eq!(year_only.year.as_deref(), Some("2001"));
        assert_eq!(year_only.month, None);

        let literal = BibEntry::from_csl(&item(json!({"id": "Z", "issued": {"literal": "ca. 1900"}})));
        assert_eq!(literal.year, None);
    }

    #[test]
    fn test_container_title_routing() {
        let article = BibEntry::from_csl(&item(json!({
            "id": "A", "type": "article-journal", "container-title": "Nature"
        })));
        assert_eq!(article.journal.as_deref(), Some("Nature"));
        assert_eq!(article.booktitle, None);

        let chapter = BibEntry::from_csl(&item(json!({
            "id": "B", "type": "chapter", "container-title": "Collected Essays"
        })));
        assert_eq!(chapter.journal, None);
        assert_eq!(chapter.booktitle.as_deref(), Some("Collected Essays"));
    }

    #[test]
    fn test_render_carries_through_fields() {
        let entry = BibEntry::from_csl(&item(json!({
            "id": "K",
            "type": "article-journal",
            "title": "On Things",
            "volume": 12,
            "issue": "3",
            "page": "1-10",
            "publisher": "Pub",
            "publisher-place": "Paris",
            "URL": "https://example.org",
            "DOI": "10.1/x"
        })));
        let rendered = entry.render();
        assert!(rendered.starts_with("@article{K,\n"));
        assert!(rendered.contains("  title = {On Things},\n"));
        assert!(rendered.contains("  volume = {12},\n"));
        assert!(rendered.contains("  number = {3},\n"));
        assert!(rendered.contains("  pages = {1-10},\n"));
        assert!(rendered.contains("  address = {Paris},\n"));
        assert!(rendered.contains("  url = {https://example.org},\n"));
        assert!(rendered.contains("  doi = {10.1/x},\n"));
        assert!(!rendered.contains("editor"));
        assert!(rendered.ends_with('}'));
    }

    proptest! {
        #[test]
        fn prop_backfilled_ids_are_positional_and_unique(mask in proptest::collection::vec(any::<bool>(), 0..24)) {
            let items: Vec<CslItem> = mask
                .iter()
                .enumerate()
                .map(|(idx, has_id)| {
                    if *has_id {
                        item(json!({"id": format!("explicit-{idx}")}))
                    } else {
                        item(json!({"title": "t"}))
                    }
                })
                .collect();
            let filled = backfill_ids(&items);
            prop_assert_eq!(filled.len(), items.len());
            let mut seen = std::collections::BTreeSet::new();
            for (idx, (has_id, record)) in mask.iter().zip(&filled).enumerate() {
                let id = record.id_text().unwrap();
                if !*has_id {
                    prop_assert_eq!(&id, &format!("ITEM-{}", idx + 1));
                }
                prop_assert!(seen.insert(id));
            }
        }
    }
}

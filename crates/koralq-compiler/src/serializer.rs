//! The `QuerySerializer` front door and the JSON-LD document envelope.

use serde_json::{Map, Value, json};

use koralq_core::{Reports, status};

use crate::lang;
use crate::{Error, Result};

/// JSON-LD context every emitted document points at.
pub use koralq_core::CONTEXT;

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLanguage {
    Annis,
    Cosmas2,
    Cql,
    Fcsql,
    Poliqarp,
}

impl QueryLanguage {
    /// Accepts the common external tags, case-insensitively.
    pub fn from_tag(tag: &str) -> Result<Self> {
        let language = match tag.to_ascii_lowercase().as_str() {
            "annis" => QueryLanguage::Annis,
            "cosmas2" => QueryLanguage::Cosmas2,
            "cql" => QueryLanguage::Cql,
            "fcsql" => QueryLanguage::Fcsql,
            "poliqarp" | "poliqarpplus" => QueryLanguage::Poliqarp,
            _ => return Err(Error::UnknownLanguage(tag.to_string())),
        };
        Ok(language)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryLanguage::Annis => "annis",
            QueryLanguage::Cosmas2 => "cosmas2",
            QueryLanguage::Cql => "cql",
            QueryLanguage::Fcsql => "fcsql",
            QueryLanguage::Poliqarp => "poliqarpplus",
        }
    }
}

/// Builder around one translation run.
///
/// ```
/// use koralq_compiler::{QueryLanguage, QuerySerializer};
///
/// let document = QuerySerializer::new(QueryLanguage::Poliqarp)
///     .query("[base=Baum]")
///     .to_value()
///     .unwrap();
/// assert_eq!(document["query"]["wrap"]["key"], "Baum");
/// ```
#[derive(Debug, Clone)]
pub struct QuerySerializer {
    language: QueryLanguage,
    version: Option<String>,
    query: Option<String>,
    meta: Option<Value>,
    collection: Option<Value>,
}

impl QuerySerializer {
    pub fn new(language: QueryLanguage) -> Self {
        QuerySerializer {
            language,
            version: None,
            query: None,
            meta: None,
            collection: None,
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// SRU protocol version, checked by the CQL and FCS-QL front ends.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Externally supplied request meta, merged with the meta the
    /// translation itself produces (highlights, alignments).
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Externally supplied document constraint. Combined with an
    /// in-query constraint via a conjunctive `koral:docGroup`, the
    /// in-query part first.
    pub fn collection(mut self, collection: Value) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Translate and assemble the document.
    pub fn to_value(&self) -> Result<Value> {
        let query = self.query.as_deref().ok_or(Error::NoQuery)?;
        let mut reports = Reports::new();
        let version = self.version.as_deref();
        let compilation = match self.language {
            QueryLanguage::Annis => lang::annis::compile(query, &mut reports),
            QueryLanguage::Cosmas2 => lang::cosmas2::compile(query, &mut reports),
            QueryLanguage::Cql => lang::cql::compile(query, version, &mut reports),
            QueryLanguage::Fcsql => lang::fcsql::compile(query, version, &mut reports),
            QueryLanguage::Poliqarp => lang::poliqarp::compile(query, &mut reports),
        };

        let mut document = Map::new();
        document.insert("@context".into(), json!(CONTEXT));
        if let Some(node) = &compilation.query {
            document.insert("query".into(), node.to_value());
        }
        if let Some(collection) = join_collections(compilation.collection, self.collection.clone())
        {
            document.insert("collection".into(), collection);
        }
        let meta = assemble_meta(self.meta.clone(), &reports);
        if !meta.is_empty() {
            document.insert("meta".into(), Value::Object(meta));
        }
        if !reports.errors.is_empty() {
            document.insert("errors".into(), reports.errors_value());
        }
        if !reports.warnings.is_empty() {
            document.insert("warnings".into(), reports.warnings_value());
        }
        if !reports.messages.is_empty() {
            document.insert("messages".into(), reports.messages_value());
        }
        Ok(Value::Object(document))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value()?)?)
    }
}

/// A document whose only payload is an error entry, for callers that
/// must answer with a document even when the request itself is broken.
pub fn error_document(code: u32, message: &str) -> Value {
    json!({
        "@context": CONTEXT,
        "errors": [[code, message]],
    })
}

/// Mirror of [`Error`] as an in-document status code.
pub fn error_status(error: &Error) -> u32 {
    match error {
        Error::NoQuery => status::NO_QUERY,
        Error::UnknownLanguage(_) => status::UNKNOWN_QUERY_LANGUAGE,
        Error::Serialization(_) => status::SERIALIZATION_FAILED,
    }
}

fn join_collections(from_query: Option<Value>, external: Option<Value>) -> Option<Value> {
    match (from_query, external) {
        (Some(a), Some(b)) => Some(json!({
            "@type": "koral:docGroup",
            "operation": "operation:and",
            "operands": [a, b],
        })),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// External meta fields first, then whatever the translation gathered.
fn assemble_meta(external: Option<Value>, reports: &Reports) -> Map<String, Value> {
    let mut meta = match external {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("meta".into(), other);
            map
        }
        None => Map::new(),
    };
    if !reports.highlight.is_empty() {
        meta.insert("highlight".into(), json!(reports.highlight));
    }
    if !reports.alignment.is_empty() {
        let pairs: Vec<Value> = reports
            .alignment
            .iter()
            .map(|(l, r)| json!([l, r]))
            .collect();
        meta.insert("alignment".into(), json!(pairs));
    }
    meta
}

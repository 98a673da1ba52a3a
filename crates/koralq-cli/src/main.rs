//! `koralq`: translate one corpus query to a KoralQuery document.
//!
//! The document always reaches stdout, even for broken requests (the
//! error travels inside it); the exit code says whether translation
//! succeeded.

use std::io::Read;
use std::process::ExitCode;

use clap::Parser;

use koralq_compiler::serializer::{error_document, error_status};
use koralq_compiler::{QueryLanguage, QuerySerializer};

#[derive(Parser)]
#[command(name = "koralq", version, about = "Compile corpus queries to KoralQuery JSON-LD")]
struct Args {
    /// Query text; read from stdin when omitted.
    query: Option<String>,

    /// Source language: poliqarpplus, cosmas2, annis, cql, or fcsql.
    #[arg(short, long, default_value = "poliqarpplus")]
    language: String,

    /// SRU protocol version, for cql and fcsql.
    #[arg(long)]
    version: Option<String>,

    /// Pretty-print the document.
    #[arg(short, long)]
    pretty: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let query = match args.query {
        Some(query) => query,
        None => {
            let mut buffer = String::new();
            if std::io::stdin().read_to_string(&mut buffer).is_err() {
                eprintln!("koralq: could not read the query from stdin");
                return ExitCode::FAILURE;
            }
            buffer
        }
    };

    let document = match build(&args.language, query.trim(), args.version.as_deref()) {
        Ok(document) => document,
        Err(err) => {
            let document = error_document(error_status(&err), &err.to_string());
            emit(&document, args.pretty);
            return ExitCode::FAILURE;
        }
    };
    emit(&document, args.pretty);
    if document.get("errors").is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn build(
    language: &str,
    query: &str,
    version: Option<&str>,
) -> koralq_compiler::Result<serde_json::Value> {
    let language = QueryLanguage::from_tag(language)?;
    let mut serializer = QuerySerializer::new(language).query(query);
    if let Some(version) = version {
        serializer = serializer.version(version);
    }
    serializer.to_value()
}

fn emit(document: &serde_json::Value, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(document)
    } else {
        serde_json::to_string(document)
    };
    match rendered {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("koralq: {err}"),
    }
}

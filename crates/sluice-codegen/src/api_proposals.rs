//! The API proposal manifest
//!
//! Every `vscode.proposed.<name>.d.ts` file seen on the input contributes one
//! entry; the manifest is rendered once the input ends.

use crate::GENERATED_FILE_BANNER;
use futures::stream::{self, StreamExt};
use regex::Regex;
use sluice_core::stream::RecordStream;
use sluice_core::{CoreError, CoreResult, FileRecord, NewLine};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Manifest location, relative to the source root
pub const PROPOSALS_MANIFEST: &str = "vs/workbench/services/extensions/common/extensionsApiProposals.ts";

const PROPOSAL_URL_BASE: &str = "https://raw.githubusercontent.com/microsoft/vscode/main/src/vscode-dts";

fn proposal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"vscode\.proposed\.([a-zA-Z\d]+)\.d\.ts$").expect("static regex"))
}

#[derive(Debug, Clone)]
pub struct ApiProposalNameAggregator {
    names: BTreeSet<String>,
    eol: NewLine,
}

impl ApiProposalNameAggregator {
    pub fn new(eol: NewLine) -> Self {
        Self {
            names: BTreeSet::new(),
            eol,
        }
    }

    /// Keep the line endings of the manifest already under `src`
    pub fn for_source(src: &Path) -> Self {
        let eol = std::fs::read_to_string(src.join(PROPOSALS_MANIFEST))
            .map(|text| NewLine::detect(&text))
            .unwrap_or_else(|_| NewLine::platform());
        Self::new(eol)
    }

    /// Record the proposal `record` declares, if any
    pub fn add(&mut self, record: &FileRecord) -> bool {
        let Some(caps) = proposal_regex().captures(record.file_name()) else {
            return false;
        };
        self.names.insert(caps[1].to_string())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn eol(&self) -> NewLine {
        self.eol
    }

    pub fn render(&self) -> String {
        let eol = self.eol.as_str();
        let entries = self
            .names
            .iter()
            .map(|name| format!("\t{}: '{}/vscode.proposed.{}.d.ts'", name, PROPOSAL_URL_BASE, name))
            .collect::<Vec<_>>()
            .join(&format!(",{}", eol));

        let mut lines: Vec<&str> = GENERATED_FILE_BANNER.to_vec();
        lines.extend(["", "export const allApiProposals = Object.freeze({", entries.as_str()]);
        lines.extend(["});", "export type ApiProposalName = keyof typeof allApiProposals;", ""]);
        lines.join(eol)
    }

    /// The manifest record, destined for `base`
    pub fn finish(&self, base: impl Into<PathBuf>) -> FileRecord {
        FileRecord::new(base, PROPOSALS_MANIFEST, self.render())
    }
}

/// Drain `input` into the aggregator; the first upstream error aborts
pub async fn aggregate(mut input: RecordStream, aggregator: &mut ApiProposalNameAggregator) -> CoreResult<usize> {
    let mut seen = 0;
    while let Some(record) = input.next().await {
        if aggregator.add(&record?) {
            seen += 1;
        }
    }
    Ok(seen)
}

/// A stream holding just the manifest for the proposals found in `input`
pub fn generate_api_proposal_names(input: RecordStream, src: impl Into<PathBuf>) -> RecordStream {
    let src = src.into();
    stream::once(async move {
        let mut aggregator = ApiProposalNameAggregator::for_source(&src);
        let seen = aggregate(input, &mut aggregator).await?;
        debug!("Collected {} API proposals", seen);
        Ok::<_, CoreError>(aggregator.finish(src))
    })
    .boxed()
}

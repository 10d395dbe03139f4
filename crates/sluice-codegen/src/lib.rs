//! Generated sources: `monaco.d.ts` and the API proposal manifest

pub mod api_proposals;
pub mod declarations;
pub mod error;

pub use api_proposals::{generate_api_proposal_names, ApiProposalNameAggregator, PROPOSALS_MANIFEST};
pub use declarations::{DeclarationArtifact, DeclarationGenerator, ExecuteOutcome, GeneratorConfig};
pub use error::DeclarationError;

/// Leading lines of every generated source file
pub(crate) const GENERATED_FILE_BANNER: &[&str] = &[
    "/*---------------------------------------------------------------------------------------------",
    " *  Copyright (c) Microsoft Corporation. All rights reserved.",
    " *  Licensed under the MIT License. See License.txt in the project root for license information.",
    " *--------------------------------------------------------------------------------------------*/",
    "",
    "// THIS IS A GENERATED FILE. DO NOT EDIT DIRECTLY.",
];

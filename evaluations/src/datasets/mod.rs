//! Labeled-corpus dataset conversion (A8 dataset loaders). Both loaders
//! produce the same `ConvertedParagraph`/`ConvertedQuestion` shape so the
//! rest of the harness never branches on dataset kind again past this point.

pub mod beir;
pub mod nq;

use std::path::Path;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct ConvertedQuestion {
    pub id: String,
    pub question: String,
    pub answers: Vec<String>,
    pub is_impossible: bool,
}

#[derive(Debug, Clone)]
pub struct ConvertedParagraph {
    pub id: String,
    pub title: String,
    pub context: String,
    pub questions: Vec<ConvertedQuestion>,
}

/// Which labeled corpus a run is evaluating against. `NaturalQuestions`
/// drives `datasets::nq`; the rest are BEIR-layout corpora sharing
/// `datasets::beir` and differing only in id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DatasetKind {
    NaturalQuestions,
    Fever,
    Scifact,
    NfCorpus,
}

impl DatasetKind {
    pub fn id(self) -> &'static str {
        match self {
            Self::NaturalQuestions => "natural-questions",
            Self::Fever => "fever",
            Self::Scifact => "scifact",
            Self::NfCorpus => "nfcorpus",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NaturalQuestions => "Natural Questions",
            Self::Fever => "FEVER",
            Self::Scifact => "SciFact",
            Self::NfCorpus => "NFCorpus",
        }
    }

    pub fn source_prefix(self) -> &'static str {
        match self {
            Self::NaturalQuestions => "nq",
            Self::Fever => "fever",
            Self::Scifact => "scifact",
            Self::NfCorpus => "nfcorpus",
        }
    }
}

/// Dispatches to the matching loader. `include_unanswerable` keeps
/// Natural Questions' yes/no-only and impossible examples (dropped by
/// default since they have no short-answer chunk to score retrieval
/// against); BEIR corpora have no such notion and ignore the flag.
pub fn convert(
    raw_dir: &Path,
    kind: DatasetKind,
    include_unanswerable: bool,
) -> Result<Vec<ConvertedParagraph>> {
    match kind {
        DatasetKind::NaturalQuestions => nq::convert_nq(raw_dir, include_unanswerable, None),
        other => beir::convert_beir(raw_dir, other),
    }
}

//! Merge state: the commits being merged and a summary of outstanding conflicts.

use crate::core::templates::{render_template, TemplateContext, TEMPLATES};
use serde::Serialize;
use std::collections::BTreeMap;

/// One side of a merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRef {
    pub commit: String,
    pub abbrev_commit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl CommitRef {
    /// `branch "main"`, or the abbreviated commit for anonymous commits
    pub fn describe(&self) -> String {
        match &self.branch {
            Some(branch) => format!("branch \"{branch}\""),
            None => self.abbrev_commit.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<CommitRef>,
    pub ours: CommitRef,
    pub theirs: CommitRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Conflict counts summarised to two levels: dataset -> part -> count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConflictSummary(BTreeMap<String, BTreeMap<String, usize>>);

impl ConflictSummary {
    pub fn record(&mut self, dataset: impl Into<String>, part: impl Into<String>) {
        *self
            .0
            .entry(dataset.into())
            .or_default()
            .entry(part.into())
            .or_default() += 1;
    }

    pub fn total(&self) -> usize {
        self.0.values().flat_map(BTreeMap::values).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, usize>)> {
        self.0.iter().map(|(path, parts)| (path.as_str(), parts))
    }
}

fn conflicts_noun(count: usize) -> &'static str {
    if count == 1 {
        "conflict"
    } else {
        "conflicts"
    }
}

/// Text for an in-progress merge as shown by `status`
pub fn merge_status_to_text(merge: &MergeContext, conflicts: &ConflictSummary) -> String {
    let theirs = merge.theirs.describe();
    let ours = merge.ours.describe();
    let header = render_template(
        TEMPLATES.merging,
        &TemplateContext {
            theirs: Some(&theirs),
            ours: Some(&ours),
            ..Default::default()
        },
    );

    if conflicts.is_empty() {
        return [
            header.as_str(),
            TEMPLATES.no_conflicts,
            TEMPLATES.merge_hint_no_conflicts,
        ]
        .join("\n\n");
    }

    let mut lines = vec![TEMPLATES.conflicts_header.to_string()];
    for (dataset, parts) in conflicts.datasets() {
        lines.push(render_template(
            TEMPLATES.conflicts_dataset,
            &TemplateContext {
                dataset: Some(dataset),
                ..Default::default()
            },
        ));
        for (part, count) in parts {
            lines.push(render_template(
                TEMPLATES.conflicts_part,
                &TemplateContext {
                    part: Some(part),
                    count: Some(*count as u64),
                    label: Some(conflicts_noun(*count)),
                    ..Default::default()
                },
            ));
        }
    }

    [
        header,
        lines.join("\n"),
        TEMPLATES.merge_hint_conflicts.to_string(),
    ]
    .join("\n\n")
}

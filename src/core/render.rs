//! Text and JSON renderings of a [`StatusReport`].
//!
//! Both renderers are pure functions of the report. Problems interpreting the stored
//! spatial filter are resolved here: the text renderer prints the diagnostic in place
//! of the filter description, the JSON renderer keeps the raw stored value and prints
//! the diagnostic as a warning on stderr.

use crate::core::crs::ProjReprojector;
use crate::core::diff::DatasetPart;
use crate::core::diff_status::DiffStatusCounts;
use crate::core::error::Result;
use crate::core::merge::merge_status_to_text;
use crate::core::output::print_warning;
use crate::core::report::{ReportState, StatusReport, UpstreamStatus, WorkingCopyStatus};
use crate::core::spatial_filter::SpatialFilterConfig;
use crate::core::templates::{render_template, TemplateContext, TEMPLATES};
use serde_json::{json, Map, Value};

pub const DOCUMENT_ROOT: &str = "kart.status/v1";

/// The `{"kart.status/v1": {...}}` document
pub fn render_document(report: &StatusReport) -> Result<Value> {
    let mut status = Map::new();
    status.insert(
        "commit".to_string(),
        json!(report.commit.as_ref().map(|c| &c.id)),
    );
    status.insert(
        "abbrevCommit".to_string(),
        json!(report.commit.as_ref().map(|c| &c.short_id)),
    );
    status.insert("branch".to_string(), json!(report.branch));
    status.insert("upstream".to_string(), serde_json::to_value(&report.upstream)?);
    status.insert(
        "spatialFilter".to_string(),
        spatial_filter_to_json(report.spatial_filter.as_ref())?,
    );

    match &report.state {
        ReportState::Merging { merge, conflicts } => {
            status.insert("state".to_string(), json!("merging"));
            status.insert("merging".to_string(), serde_json::to_value(merge)?);
            status.insert("conflicts".to_string(), serde_json::to_value(conflicts)?);
        }
        ReportState::Normal { working_copy } => {
            status.insert("workingCopy".to_string(), serde_json::to_value(working_copy)?);
        }
    }

    let mut document = Map::new();
    document.insert(DOCUMENT_ROOT.to_string(), Value::Object(status));
    Ok(Value::Object(document))
}

pub fn render_json(report: &StatusReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(&render_document(report)?)?)
}

fn spatial_filter_to_json(filter: Option<&SpatialFilterConfig>) -> Result<Value> {
    let Some(filter) = filter else {
        return Ok(Value::Null);
    };
    match filter.canonicalize() {
        Ok(canonical) => Ok(serde_json::to_value(canonical)?),
        Err(diagnostic) => {
            print_warning(&diagnostic.to_string());
            Ok(serde_json::to_value(filter)?)
        }
    }
}

pub fn render_text(report: &StatusReport) -> String {
    let mut sections = vec![branch_status_to_text(report)];

    if let Some(filter) = &report.spatial_filter {
        sections.push(spatial_filter_to_text(filter));
    }

    match &report.state {
        ReportState::Merging { merge, conflicts } => {
            sections.push(merge_status_to_text(merge, conflicts));
        }
        ReportState::Normal { working_copy } => {
            if !report.is_empty_repo() {
                sections.push(working_copy_status_to_text(working_copy.as_ref()));
            }
        }
    }

    sections.join("\n\n")
}

fn branch_status_to_text(report: &StatusReport) -> String {
    let Some(commit) = &report.commit else {
        return TEMPLATES.empty_repository.to_string();
    };

    let Some(branch) = &report.branch else {
        return render_template(
            TEMPLATES.head_detached,
            &TemplateContext {
                commit: Some(&commit.short_id),
                ..Default::default()
            },
        );
    };

    let mut text = render_template(
        TEMPLATES.on_branch,
        &TemplateContext {
            branch: Some(branch),
            ..Default::default()
        },
    );
    if let Some(upstream) = &report.upstream {
        text.push('\n');
        text.push_str(&upstream_status_to_text(upstream));
    }
    text
}

fn upstream_status_to_text(upstream: &UpstreamStatus) -> String {
    let template = match (upstream.ahead, upstream.behind) {
        (0, 0) => TEMPLATES.upstream_up_to_date,
        (_, 0) => TEMPLATES.upstream_ahead,
        (0, _) => TEMPLATES.upstream_behind,
        _ => TEMPLATES.upstream_diverged,
    };
    render_template(
        template,
        &TemplateContext {
            upstream: Some(&upstream.branch),
            ahead: Some(upstream.ahead),
            behind: Some(upstream.behind),
            ..Default::default()
        },
    )
}

fn spatial_filter_to_text(filter: &SpatialFilterConfig) -> String {
    match filter.wgs84_envelope(&ProjReprojector) {
        Ok(envelope) => render_template(
            TEMPLATES.spatial_filter_active,
            &TemplateContext {
                filter: Some(&filter.description()),
                envelope: Some(&envelope.to_string()),
                ..Default::default()
            },
        ),
        Err(diagnostic) => diagnostic.to_string(),
    }
}

fn working_copy_status_to_text(working_copy: Option<&WorkingCopyStatus>) -> String {
    let Some(working_copy) = working_copy else {
        return TEMPLATES.no_working_copy.to_string();
    };
    match &working_copy.changes {
        None => TEMPLATES.working_copy_clean.to_string(),
        Some(changes) => format!(
            "{}\n{}",
            TEMPLATES.working_copy_changes,
            diff_status_to_text(changes)
        ),
    }
}

/// Outline of changes: dataset, then part, then one line per change type
pub fn diff_status_to_text(counts: &DiffStatusCounts) -> String {
    let mut lines = Vec::new();
    for (dataset, parts) in counts.datasets() {
        lines.push(render_template(
            TEMPLATES.diff_dataset,
            &TemplateContext {
                dataset: Some(dataset),
                ..Default::default()
            },
        ));
        for part in DatasetPart::DISPLAY_ORDER {
            let Some(part_counts) = parts.get(part.as_str()) else {
                continue;
            };
            lines.push(render_template(
                TEMPLATES.diff_part,
                &TemplateContext {
                    part: Some(part.as_str()),
                    ..Default::default()
                },
            ));
            for (change_type, count) in part_counts.iter() {
                lines.push(render_template(
                    TEMPLATES.diff_count,
                    &TemplateContext {
                        count: Some(count),
                        label: Some(change_type.label()),
                        ..Default::default()
                    },
                ));
            }
        }
    }
    lines.join("\n")
}

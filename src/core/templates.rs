//! Template system for the fixed wording of text status output.
//!
//! Every sentence the text renderer prints lives here as a template with `{placeholder}`
//! fields, so that golden-output tests and the renderer agree on the exact wording.
//! Rendering is a single pass over the template followed by colour application for the
//! few templates that carry styling.
//!
//! # Public API
//! - [`Templates`]: Template definitions for all status sections
//! - [`TemplateContext`]: Values substituted into placeholders
//! - [`TEMPLATES`]: Global template instance
//! - [`render_template`]: Rendering with colours
//! - [`render_template_plain`]: Plain text rendering for testing
//! - [`strip_ansi_codes`]: Utility for removing colour codes

use colored::*;

/// Template definitions for all text status output
pub struct Templates {
    // Branch status
    pub empty_repository: &'static str,
    pub head_detached: &'static str,
    pub on_branch: &'static str,

    // Upstream status
    pub upstream_up_to_date: &'static str,
    pub upstream_ahead: &'static str,
    pub upstream_behind: &'static str,
    pub upstream_diverged: &'static str,

    // Spatial filter status
    pub spatial_filter_active: &'static str,

    // Working copy status
    pub no_working_copy: &'static str,
    pub working_copy_clean: &'static str,
    pub working_copy_changes: &'static str,
    pub diff_dataset: &'static str,
    pub diff_part: &'static str,
    pub diff_count: &'static str,

    // Merge status
    pub merging: &'static str,
    pub conflicts_header: &'static str,
    pub conflicts_dataset: &'static str,
    pub conflicts_part: &'static str,
    pub no_conflicts: &'static str,
    pub merge_hint_conflicts: &'static str,
    pub merge_hint_no_conflicts: &'static str,
}

/// Global templates instance
pub static TEMPLATES: Templates = Templates {
    empty_repository: "Empty repository.\n  (use \"kart import\" to add some data)",
    head_detached: "HEAD detached at {commit}",
    on_branch: "On branch {branch}",

    upstream_up_to_date: "Your branch is up to date with '{upstream}'.",
    upstream_ahead: "Your branch is ahead of '{upstream}' by {ahead} {ahead_noun}.\n  (use \"kart push\" to publish your local commits)",
    upstream_behind: "Your branch is behind '{upstream}' by {behind} {behind_noun}, and can be fast-forwarded.\n  (use \"kart pull\" to update your local branch)",
    upstream_diverged: "Your branch and '{upstream}' have diverged,\nand have {ahead} and {behind} different commits each, respectively.\n  (use \"kart pull\" to merge the remote branch into yours)",

    spatial_filter_active: "A {filter} is active, limiting repo to a specific region inside {envelope}",

    no_working_copy: "No working copy\n  (use \"kart checkout\" to create a working copy)\n",
    working_copy_clean: "Nothing to commit, working copy clean",
    working_copy_changes: "Changes in working copy:\n  (use \"kart commit\" to commit)\n  (use \"kart restore\" to discard changes)\n",
    diff_dataset: "  {dataset}:",
    diff_part: "    {part}:",
    diff_count: "      {count} {label}",

    merging: "Merging {theirs} into {ours}",
    conflicts_header: "Conflicts:\n",
    conflicts_dataset: "{dataset}:",
    conflicts_part: "  {part}: {count} {label}",
    no_conflicts: "No conflicts!",
    merge_hint_conflicts: "View conflicts with \"kart conflicts\" and resolve them with \"kart resolve\".\nOnce no conflicts remain, complete this merge with \"kart merge --continue\".\nOr use \"kart merge --abort\" to return to the previous state.",
    merge_hint_no_conflicts: "Use \"kart merge --continue\" to complete the merge,\nor use \"kart merge --abort\" to return to the previous state.",
};

/// Context for template rendering
#[derive(Debug, Default)]
pub struct TemplateContext<'a> {
    pub commit: Option<&'a str>,
    pub branch: Option<&'a str>,
    pub upstream: Option<&'a str>,
    pub ahead: Option<usize>,
    pub behind: Option<usize>,
    pub filter: Option<&'a str>,
    pub envelope: Option<&'a str>,
    pub dataset: Option<&'a str>,
    pub part: Option<&'a str>,
    pub count: Option<u64>,
    pub label: Option<&'a str>,
    pub ours: Option<&'a str>,
    pub theirs: Option<&'a str>,
}

/// Simple pluraliser for commit/commits
pub fn commits_noun(count: usize) -> &'static str {
    if count == 1 {
        "commit"
    } else {
        "commits"
    }
}

/// Render a template with context and apply colours
pub fn render_template(template: &str, context: &TemplateContext) -> String {
    let estimated_capacity = template.len()
        + context.commit.map_or(0, str::len)
        + context.branch.map_or(0, str::len)
        + context.upstream.map_or(0, str::len)
        + context.filter.map_or(0, str::len)
        + context.envelope.map_or(0, str::len)
        + context.dataset.map_or(0, str::len)
        + context.part.map_or(0, str::len)
        + context.label.map_or(0, str::len)
        + 64;

    let mut result = String::with_capacity(estimated_capacity);
    render_template_single_pass(template, context, &mut result);
    apply_colors(&result, template, context)
}

fn push_number<T: std::fmt::Display>(output: &mut String, value: Option<T>) -> bool {
    use std::fmt::Write;
    match value {
        Some(value) => {
            let _ = write!(output, "{value}");
            true
        }
        None => false,
    }
}

fn push_str(output: &mut String, value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            output.push_str(value);
            true
        }
        None => false,
    }
}

/// Single-pass template renderer
fn render_template_single_pass(template: &str, context: &TemplateContext, output: &mut String) {
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '{' {
            output.push(ch);
            continue;
        }

        let mut placeholder = String::new();
        let mut found_closing = false;
        while let Some(&next_ch) = chars.peek() {
            chars.next();
            if next_ch == '}' {
                found_closing = true;
                break;
            }
            placeholder.push(next_ch);
        }

        if !found_closing {
            // No closing brace found, treat as literal
            output.push(ch);
            output.push_str(&placeholder);
            continue;
        }

        let substituted = match placeholder.as_str() {
            "commit" => push_str(output, context.commit),
            "branch" => push_str(output, context.branch),
            "upstream" => push_str(output, context.upstream),
            "ahead" => push_number(output, context.ahead),
            "behind" => push_number(output, context.behind),
            "ahead_noun" => push_str(output, context.ahead.map(commits_noun)),
            "behind_noun" => push_str(output, context.behind.map(commits_noun)),
            "filter" => push_str(output, context.filter),
            "envelope" => push_str(output, context.envelope),
            "dataset" => push_str(output, context.dataset),
            "part" => push_str(output, context.part),
            "count" => push_number(output, context.count),
            "label" => push_str(output, context.label),
            "ours" => push_str(output, context.ours),
            "theirs" => push_str(output, context.theirs),
            _ => false,
        };

        if !substituted {
            // Unknown or unset placeholder, keep as-is
            output.push('{');
            output.push_str(&placeholder);
            output.push('}');
        }
    }
}

/// Colour application for styled templates
fn apply_colors(text: &str, template: &str, context: &TemplateContext) -> String {
    use std::fmt::Write;

    let mut result = String::with_capacity(text.len() + 32);

    match template {
        t if t == TEMPLATES.head_detached => {
            let _ = write!(
                result,
                "{} {}",
                "HEAD detached at".red(),
                context.commit.unwrap_or_default()
            );
        }
        _ => result.push_str(text),
    }

    result
}

/// Strip ANSI color codes for testing
pub fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next(); // consume '['
            for ch in chars.by_ref() {
                if ch.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Render template without colours for testing
pub fn render_template_plain(template: &str, context: &TemplateContext) -> String {
    strip_ansi_codes(&render_template(template, context))
}

use crate::error::ArchiveError;

#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub action: &'a str,
    pub variable: &'a str,
    pub category: &'a str,
    pub file: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

fn format_line(event: &WarnEvent<'_>) -> String {
    format!(
        "SAFRAN_WARN code={} stage={} action={} variable={} category={} file={} reason={} err={}",
        sanitize_value(event.code),
        sanitize_value(event.stage),
        sanitize_value(event.action),
        sanitize_value(event.variable),
        sanitize_value(event.category),
        sanitize_value(event.file),
        sanitize_value(event.reason),
        sanitize_value(event.err),
    )
}

pub fn emit(event: WarnEvent<'_>) {
    tracing::warn!("{}", format_line(&event));
}

/// Shorthand for a scoped archive error raised while working on one file.
pub fn emit_error(stage: &str, action: &str, variable: &str, category: &str, err: &ArchiveError) {
    let file = match err {
        ArchiveError::GridMismatch { path, .. }
        | ArchiveError::EmptyTimeAxis { path }
        | ArchiveError::Io { path, .. } => path.display().to_string(),
        ArchiveError::UnclassifiableName { name, .. } => name.clone(),
        _ => String::new(),
    };
    emit(WarnEvent {
        code: err.code().as_str(),
        stage,
        action,
        variable,
        category,
        file: &file,
        reason: "scoped-failure",
        err: &err.to_string(),
    });
}

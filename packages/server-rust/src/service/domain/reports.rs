//! Async operations: `v1:todos.export` and `v1:reports.generate`.
//!
//! Both validate their arguments up front and return an [`AsyncJob`] that
//! reads the todo table only when it finally runs, so the result reflects the
//! table at completion time rather than at dispatch time.

use std::fmt::Write as _;
use std::sync::Arc;

use opencall_core::{Args, FieldResult, FromArgs};
use serde_json::json;

use super::DomainContext;
use crate::service::handler::{AsyncJob, HandlerError, HandlerResult, JobOutput};
use crate::storage::todos::Todo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

#[derive(Debug)]
struct ExportArgs {
    format: ExportFormat,
}

impl FromArgs for ExportArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        let format = match args.enumeration("format", &["csv", "json"], "csv")?.as_str() {
            "json" => ExportFormat::Json,
            _ => ExportFormat::Csv,
        };
        Ok(Self { format })
    }
}

#[derive(Debug)]
struct ReportArgs {
    kind: String,
}

impl FromArgs for ReportArgs {
    fn from_args(args: &Args<'_>) -> FieldResult<Self> {
        Ok(Self {
            kind: args.enumeration("type", &["summary", "detailed"], "summary")?,
        })
    }
}

/// `id,title,completed,createdAt` header plus one unquoted row per todo.
fn render_csv(items: &[Todo]) -> String {
    let mut out = String::from("id,title,completed,createdAt");
    for todo in items {
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "\n{},{},{},{}",
            todo.id, todo.title, todo.completed, todo.created_at
        );
    }
    out
}

/// `v1:todos.export`. The rendered text doubles as the chunkable payload.
///
/// # Errors
///
/// Validation only; the job itself fails only if serialization does.
pub fn export(ctx: &Arc<DomainContext>, args: &Args<'_>) -> HandlerResult<AsyncJob> {
    let ExportArgs { format } = args.decode()?;
    let ctx = Arc::clone(ctx);

    Ok(AsyncJob::new(move || {
        let items = ctx.todos.list();
        let data = match format {
            ExportFormat::Csv => render_csv(&items),
            ExportFormat::Json => {
                serde_json::to_string(&items).map_err(|err| HandlerError::Internal(err.into()))?
            }
        };
        let result = json!({
            "format": format.as_str(),
            "data": data,
            "count": items.len(),
        });
        Ok(JobOutput::new(result).with_text(data))
    }))
}

/// `v1:reports.generate`: completion counts over the whole table.
///
/// # Errors
///
/// Validation only.
pub fn generate(ctx: &Arc<DomainContext>, args: &Args<'_>) -> HandlerResult<AsyncJob> {
    let ReportArgs { kind } = args.decode()?;
    let ctx = Arc::clone(ctx);

    Ok(AsyncJob::new(move || {
        let items = ctx.todos.list();
        let completed = items.iter().filter(|todo| todo.completed).count();
        Ok(JobOutput::new(json!({
            "type": kind,
            "totalTodos": items.len(),
            "completedTodos": completed,
            "pendingTodos": items.len() - completed,
            "generatedAt": ctx.timestamp(),
        })))
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;
    use crate::service::domain::fixtures::context;
    use crate::service::domain::todos;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn seed(ctx: &DomainContext) {
        for title in ["alpha", "beta", "gamma"] {
            let m = map(json!({ "title": title }));
            todos::create(ctx, &Args::new(&m)).unwrap();
        }
        let first = ctx.todos.list()[0].id.clone();
        let m = map(json!({ "id": first }));
        todos::complete(ctx, &Args::new(&m)).unwrap();
    }

    #[test]
    fn csv_export_renders_header_and_rows() {
        let (ctx, _) = context();
        seed(&ctx);
        let m = map(json!({}));
        let output = export(&ctx, &Args::new(&m)).unwrap().run().unwrap();

        assert_eq!(output.result["format"], "csv");
        assert_eq!(output.result["count"], 3);
        let data = output.result["data"].as_str().unwrap();
        let lines: Vec<&str> = data.lines().collect();
        assert_eq!(lines[0], "id,title,completed,createdAt");
        assert!(lines[1].ends_with(",alpha,true,2026-01-01T00:00:00.000Z"));
        assert!(lines[2].contains(",beta,false,"));
        assert_eq!(output.text.as_deref(), Some(data));
    }

    #[test]
    fn json_export_is_the_item_array() {
        let (ctx, _) = context();
        seed(&ctx);
        let m = map(json!({ "format": "json" }));
        let output = export(&ctx, &Args::new(&m)).unwrap().run().unwrap();

        let parsed: Value =
            serde_json::from_str(output.result["data"].as_str().unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
        assert_eq!(parsed[1]["title"], "beta");
    }

    #[test]
    fn export_reads_the_table_when_the_job_runs() {
        let (ctx, _) = context();
        let m = map(json!({}));
        let job = export(&ctx, &Args::new(&m)).unwrap();
        seed(&ctx);
        assert_eq!(job.run().unwrap().result["count"], 3);
    }

    #[test]
    fn empty_csv_export_is_just_the_header() {
        let (ctx, _) = context();
        let m = map(json!({}));
        let output = export(&ctx, &Args::new(&m)).unwrap().run().unwrap();
        assert_eq!(output.result["data"], "id,title,completed,createdAt");
    }

    #[test]
    fn export_rejects_unknown_format_before_scheduling() {
        let (ctx, _) = context();
        let m = map(json!({ "format": "xml" }));
        let err = export(&ctx, &Args::new(&m)).unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
    }

    #[test]
    fn report_counts_completion() {
        let (ctx, clock) = context();
        seed(&ctx);
        let m = map(json!({ "type": "detailed" }));
        let job = generate(&ctx, &Args::new(&m)).unwrap();
        clock.advance(2_000);

        let output = job.run().unwrap();
        assert_eq!(
            output.result,
            json!({
                "type": "detailed",
                "totalTodos": 3,
                "completedTodos": 1,
                "pendingTodos": 2,
                "generatedAt": "2026-01-01T00:00:02.000Z",
            })
        );
        assert!(output.text.is_none());
    }
}

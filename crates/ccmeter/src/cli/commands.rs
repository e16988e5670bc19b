use crate::cli::output::{
    align_numeric_columns, colored_percent, create_table, format_reset, OutputFormat, OutputWriter,
};
use crate::config::EngineSettings;
use crate::controller::Controller;
use crate::datasources::SnapshotLoader;
use crate::error::{Error, Result};
use crate::models::{StatusView, UsageInfo};
use crate::remote::{self, AnthropicProbe, QuotaProbe};
use crate::summary::{format_cost, format_grouped, format_token_count, SummaryBuilder};
use chrono::Local;
use colored::Colorize;
use comfy_table::Cell;
use std::io::Write;
use std::sync::Arc;

/// One-shot summary of the local sources, plus remote quota when a
/// credential is configured.
pub async fn summary(settings: &EngineSettings, format: OutputFormat) -> Result<()> {
    let loader = SnapshotLoader::new(settings.config.clone());
    let builder = SummaryBuilder::new(Arc::clone(&settings.pricing), settings.today_cost);

    let stats = loader.load_stats().await;
    let projects = loader.load_project_configs().await;
    let summary = builder.build(stats.as_ref(), &projects, Local::now().date_naive());

    let usage = match &settings.credential {
        Some(credential) => {
            let probe = AnthropicProbe::new(settings.endpoint.clone())?;
            remote::poll_usage(&probe, credential).await
        }
        None => None,
    };

    let mut writer = OutputWriter::new(std::io::stdout(), format);
    write_view(&mut writer, &StatusView::new(summary, usage))
}

/// Runs the live controller and prints every published view until Ctrl-C.
pub async fn watch(
    settings: EngineSettings,
    probe: Arc<dyn QuotaProbe>,
    format: OutputFormat,
) -> Result<()> {
    let (controller, handle) = Controller::new(settings, probe);
    let mut views = handle.subscribe_summary();
    let task = tokio::spawn(controller.run());

    let mut writer = OutputWriter::new(std::io::stdout(), format);

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if format == OutputFormat::Table {
                    let banner = format!("-- refreshed {} --", view.refreshed_at.format("%H:%M:%S"));
                    writer.writeln(&banner.dimmed().to_string())?;
                }
                write_view(&mut writer, &view)?;
                writer.flush()?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    if let Err(e) = task.await {
        tracing::warn!("Controller task ended abnormally: {}", e);
    }
    Ok(())
}

/// One-shot remote quota probe. Unlike the live paths, failures surface.
pub async fn quota(settings: &EngineSettings, format: OutputFormat) -> Result<()> {
    let credential = settings.credential.as_deref().ok_or_else(|| {
        Error::Config("No API key configured (use --api-key or ANTHROPIC_API_KEY)".to_string())
    })?;

    let probe = AnthropicProbe::new(settings.endpoint.clone())?;
    let usage = probe.poll(credential).await?;

    let mut writer = OutputWriter::new(std::io::stdout(), format);
    match format {
        OutputFormat::Table => write_usage_table(&mut writer, &usage),
        _ => writer.write_json(&usage),
    }
}

pub fn write_view<W: Write>(writer: &mut OutputWriter<W>, view: &StatusView) -> Result<()> {
    match writer.format() {
        OutputFormat::Table => write_view_table(writer, view),
        _ => writer.write_json(view),
    }
}

fn write_view_table<W: Write>(writer: &mut OutputWriter<W>, view: &StatusView) -> Result<()> {
    let summary = &view.summary;

    writer.writeln(&format!(
        "{} {}",
        "Claude usage".bold(),
        summary.display_label().cyan()
    ))?;
    writer.writeln(&format!(
        "  Today:    {} messages, {} sessions, {} tool calls, ~{}",
        format_grouped(summary.today.message_count),
        format_grouped(summary.today.session_count),
        format_grouped(summary.today.tool_call_count),
        format_cost(summary.today.estimated_cost_usd),
    ))?;
    writer.writeln(&format!(
        "  All time: {} messages, {} sessions, ~{}",
        format_grouped(summary.all_time.messages),
        format_grouped(summary.all_time.sessions),
        format_cost(summary.all_time.estimated_cost_usd),
    ))?;

    if let Some(usage) = &view.usage {
        writer.writeln(&format!(
            "  Quota:    {} remaining ({} / {} tokens)",
            colored_percent(usage.display_percent()),
            format_token_count(usage.tokens_remaining),
            format_token_count(usage.tokens_limit),
        ))?;
    }

    if !summary.models.is_empty() {
        writer.writeln("")?;
        let mut table = create_table();
        table.set_header(vec!["Model", "Input", "Output", "Cache Read", "Cache Write", "Cost"]);
        for model in &summary.models {
            table.add_row(vec![
                Cell::new(&model.short_name),
                Cell::new(format_token_count(model.input_tokens)),
                Cell::new(format_token_count(model.output_tokens)),
                Cell::new(format_token_count(model.cache_read_tokens)),
                Cell::new(format_token_count(model.cache_creation_tokens)),
                Cell::new(format_cost(model.estimated_cost_usd)),
            ]);
        }
        align_numeric_columns(&mut table);
        writer.write_table(table)?;
    }

    if !summary.projects.is_empty() {
        writer.writeln("")?;
        let mut table = create_table();
        table.set_header(vec!["Project", "Last Session Cost"]);
        for project in &summary.projects {
            table.add_row(vec![
                Cell::new(&project.short_name),
                Cell::new(format_cost(project.last_cost)),
            ]);
        }
        align_numeric_columns(&mut table);
        writer.write_table(table)?;
    }

    Ok(())
}

fn write_usage_table<W: Write>(writer: &mut OutputWriter<W>, usage: &UsageInfo) -> Result<()> {
    writer.writeln(&format!(
        "Remaining: {}",
        colored_percent(usage.display_percent())
    ))?;

    let mut table = create_table();
    table.set_header(vec!["Limit", "Remaining", "Total", "Resets"]);
    table.add_row(vec![
        Cell::new("Tokens"),
        Cell::new(format_grouped(usage.tokens_remaining)),
        Cell::new(format_grouped(usage.tokens_limit)),
        Cell::new(format_reset(usage.tokens_reset)),
    ]);
    table.add_row(vec![
        Cell::new("Requests"),
        Cell::new(format_grouped(usage.requests_remaining)),
        Cell::new(format_grouped(usage.requests_limit)),
        Cell::new(format_reset(usage.requests_reset)),
    ]);
    writer.write_table(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelSummary, ProjectSummary, TokenSummary};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample_view() -> StatusView {
        let mut summary = TokenSummary::empty(NaiveDate::from_ymd_opt(2025, 10, 19).unwrap());
        summary.today.message_count = 1234;
        summary.all_time.estimated_cost_usd = dec!(10.5);
        summary.models.push(ModelSummary {
            model_id: "claude-sonnet-4-5-20250929".to_string(),
            short_name: "Sonnet 4.5".to_string(),
            input_tokens: 1_000_000,
            output_tokens: 500_000,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            estimated_cost_usd: dec!(10.5),
        });
        summary.projects.push(ProjectSummary {
            full_path: "/home/me/proj".to_string(),
            short_name: "proj".to_string(),
            last_cost: dec!(5),
        });
        StatusView::new(summary, None)
    }

    fn render(format: OutputFormat) -> String {
        colored::control::set_override(false);
        let mut buf = Vec::new();
        {
            let mut writer = OutputWriter::new(&mut buf, format);
            write_view(&mut writer, &sample_view()).unwrap();
        }
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_table_view() {
        let out = render(OutputFormat::Table);
        assert!(out.contains("Oct 19"));
        assert!(out.contains("1,234 messages"));
        assert!(out.contains("Sonnet 4.5"));
        assert!(out.contains("$10.50"));
        assert!(out.contains("proj"));
        assert!(!out.contains("Quota"));
    }

    #[test]
    fn test_json_view() {
        let out = render(OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["summary"]["display_date"], "2025-10-19");
        assert_eq!(value["summary"]["models"][0]["short_name"], "Sonnet 4.5");
        assert!(value.get("usage").is_none());
    }

    #[test]
    fn test_usage_table() {
        colored::control::set_override(false);
        let usage = UsageInfo {
            tokens_limit: 400_000,
            tokens_remaining: 292_000,
            ..Default::default()
        };
        let mut buf = Vec::new();
        {
            let mut writer = OutputWriter::new(&mut buf, OutputFormat::Table);
            write_usage_table(&mut writer, &usage).unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Remaining: 73%"));
        assert!(out.contains("292,000"));
    }

    #[tokio::test]
    async fn test_quota_without_credential() {
        let settings = EngineSettings::new(crate::config::Config::default());
        assert!(matches!(
            quota(&settings, OutputFormat::Json).await,
            Err(Error::Config(_))
        ));
    }
}

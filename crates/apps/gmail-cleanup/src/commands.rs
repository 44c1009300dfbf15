//! Command implementations
//!
//! Each command validates its input before connecting, so refusals never
//! reach the network. Mutating commands print the plan, then ask for the
//! typed confirmation the guard requires. With `--json` the only output is
//! the final JSON document.

use anyhow::Result;
use cleanup::gmail::{GMAIL_MODIFY_SCOPE, GmailAuth};
use cleanup::guard::{self, Verdict};
use cleanup::operations::{
    ClearLabelRequest, ExportRequest, LabelRequest, QueryRequest, StatsRequest, TrashRequest,
    clear_label, execute_label, execute_trash, export_messages, plan_label, plan_trash,
    run_query, sender_stats,
};
use cleanup::preview::SampleRow;
use cleanup::{AppConfig, CleanupError, ExportFormat, GmailCredentials, Mailbox, build_query};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

use crate::cli::{Commands, FilterArgs};
use crate::output::{Table, write_json};

/// Runs commands against a lazily connected mailbox
pub struct App<C, A> {
    config: AppConfig,
    json: bool,
    connect: C,
    ask: A,
    out: Box<dyn Write>,
}

/// Human-readable output, dropped in JSON mode
struct Text<'a> {
    out: &'a mut dyn Write,
    enabled: bool,
}

impl Text<'_> {
    fn line(&mut self, line: impl std::fmt::Display) -> io::Result<()> {
        if self.enabled {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    fn table(&mut self, table: &Table) -> io::Result<()> {
        if self.enabled {
            table.write_to(&mut *self.out)?;
        }
        Ok(())
    }

    fn samples(&mut self, samples: &[SampleRow]) -> io::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.line("")?;
        let mut table = Table::new(["Date", "From", "Subject"]);
        for row in samples {
            table.row([row.date.clone(), row.from.clone(), row.subject.clone()]);
        }
        self.table(&table)
    }
}

impl<M, C, A> App<C, A>
where
    M: Mailbox,
    C: FnMut() -> Result<M>,
    A: FnMut(&str) -> io::Result<String>,
{
    pub fn new(config: AppConfig, json: bool, connect: C, ask: A) -> Self {
        Self {
            config,
            json,
            connect,
            ask,
            out: Box::new(io::stdout()),
        }
    }

    /// Send all output to `out` instead of stdout
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Query { filters, sample } => self.query(&filters, sample),
            Commands::Label {
                filters,
                target_label,
                limit,
            } => self.label(&filters, target_label, limit),
            Commands::Export {
                filters,
                out,
                fmt,
                limit,
            } => self.export(&filters, &out, &fmt, limit),
            Commands::Trash {
                label,
                sample,
                execute,
                limit,
                force,
            } => self.trash(label, sample, execute, limit, force),
            Commands::LabelClear { label, limit } => self.label_clear(label, limit),
            Commands::Stats {
                filters,
                scan_limit,
                top,
            } => self.stats(&filters, scan_limit, top),
            Commands::Config { init } => self.show_config(init),
            Commands::Doctor => self.doctor(),
        }
    }

    fn text(&mut self) -> Text<'_> {
        Text {
            out: self.out.as_mut(),
            enabled: !self.json,
        }
    }

    fn emit_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        if self.json {
            write_json(self.out.as_mut(), value)?;
        }
        Ok(())
    }

    fn query(&mut self, filters: &FilterArgs, sample: Option<usize>) -> Result<()> {
        let options = filters.to_options()?;
        build_query(&options)?;
        let mailbox = (self.connect)()?;

        let result = run_query(
            &mailbox,
            &QueryRequest {
                options,
                sample: sample.unwrap_or(self.config.default_sample),
            },
        )?;
        self.emit_json(&result)?;

        let mut table = Table::new(["Metric", "Count"])
            .title("Query Summary (dry-run)")
            .right_align(1);
        table.row(["Total".to_string(), result.counts.total.to_string()]);
        table.row([
            "With attachments".to_string(),
            result.counts.with_attachments.to_string(),
        ]);
        table.row([
            "Without attachments".to_string(),
            result.counts.without_attachments.to_string(),
        ]);
        let mut text = self.text();
        text.line(format_args!("\nGmail query:\n{}\n", result.query))?;
        text.table(&table)?;
        text.samples(&result.samples)?;
        Ok(())
    }

    fn label(&mut self, filters: &FilterArgs, target_label: Option<String>, limit: usize) -> Result<()> {
        let options = filters.to_options()?;
        build_query(&options)?;
        let target_label = target_label.unwrap_or_else(|| self.config.default_target_label.clone());
        let mailbox = (self.connect)()?;

        let plan = plan_label(
            &mailbox,
            &LabelRequest {
                options,
                target_label,
                limit,
            },
        )?;
        let mut text = self.text();
        text.line(format_args!("\nGmail query:\n{}", plan.query))?;
        text.line(format_args!("\nTarget label: {}", plan.target_label))?;
        text.line(format_args!(
            "Matched {} messages, will label {}",
            plan.decision.total_matched, plan.decision.target_count
        ))?;
        if plan.decision.verdict == Verdict::EmptyNoop {
            text.line("No matching messages.")?;
        }

        let typed = match &plan.decision.confirmation_phrase {
            Some(phrase) if plan.decision.requires_confirmation => {
                (self.ask)(&format!("Type {phrase} to proceed"))?
            }
            _ => String::new(),
        };
        let mut text = self.text();
        let result = execute_label(&mailbox, &plan, &typed, |done, target| {
            let _ = text.line(format_args!("Labeled {done}/{target}"));
        })?;
        self.emit_json(&result)
    }

    fn export(&mut self, filters: &FilterArgs, out: &Path, fmt: &str, limit: Option<usize>) -> Result<()> {
        let options = filters.to_options()?;
        build_query(&options)?;
        let format: ExportFormat = fmt.parse()?;
        let mailbox = (self.connect)()?;

        let result = export_messages(
            &mailbox,
            &ExportRequest {
                options,
                out: Some(out.to_path_buf()),
                format,
                limit: limit.unwrap_or(self.config.default_export_limit),
            },
        )?;
        self.emit_json(&result)?;
        self.text().line(format_args!(
            "Exported {} of {} matching messages to {} ({})",
            result.exported,
            result.total_matched,
            out.display(),
            result.format
        ))?;
        Ok(())
    }

    fn trash(
        &mut self,
        label: String,
        sample: Option<usize>,
        execute: bool,
        limit: usize,
        force: bool,
    ) -> Result<()> {
        guard::check_label_namespace(&label).map_err(CleanupError::from)?;
        let request = TrashRequest {
            label,
            execute,
            limit,
            force,
            max_trash_without_force: self.config.max_trash_without_force,
            sample: sample.unwrap_or(self.config.default_sample),
        };
        let mailbox = (self.connect)()?;

        let plan = plan_trash(&mailbox, &request)?;
        let decision = &plan.decision;
        let mut text = self.text();
        text.line(format_args!("\nTrash scope query:\n{}", plan.query))?;
        if decision.verdict == Verdict::EmptyNoop {
            text.line("\nNo matching messages. Nothing to trash.")?;
        } else {
            text.line(format_args!(
                "\nMatched {} messages in {}",
                decision.total_matched, plan.query
            ))?;
            if !plan.samples.is_empty() {
                text.line("\nSample messages:")?;
                text.samples(&plan.samples)?;
            }
            if let Some(refusal) = decision.refusal() {
                return Err(CleanupError::from(refusal).into());
            }
            text.line("\nAbout to move messages to Trash (recoverable).")?;
            text.line(format_args!("Label: {}", plan.label))?;
            text.line(format_args!("Count: {}", decision.target_count))?;
            if decision.dry_run {
                text.line("\nDry-run only. Re-run with --execute to perform trashing.")?;
            }
        }

        let typed = match &decision.confirmation_phrase {
            Some(phrase) if decision.requires_confirmation => {
                (self.ask)(&format!("Type exactly: {phrase}"))?
            }
            _ => String::new(),
        };
        let mut text = self.text();
        let result = execute_trash(&mailbox, &plan, &typed, |done, target| {
            let _ = text.line(format_args!("Trashed {done}/{target}"));
        })?;
        self.emit_json(&result)?;

        if result.trashed > 0 {
            let mut text = self.text();
            if result.shortfall() > 0 {
                text.line(format_args!(
                    "\nWarning: trashed {} of {} targeted messages; {} were not reached.",
                    result.trashed,
                    result.target_count,
                    result.shortfall()
                ))?;
            } else {
                text.line("\nDone. Messages moved to Trash.")?;
            }
        }
        Ok(())
    }

    fn label_clear(&mut self, label: String, limit: usize) -> Result<()> {
        guard::check_label_namespace(&label).map_err(CleanupError::from)?;
        let mailbox = (self.connect)()?;

        let mut text = self.text();
        let result = clear_label(&mailbox, &ClearLabelRequest { label, limit }, |done, target| {
            let _ = text.line(format_args!("Cleared {done}/{target}"));
        })?;
        self.emit_json(&result)?;

        let mut text = self.text();
        text.line(format_args!(
            "Removed {} from {} of {} messages",
            result.label, result.cleared, result.total_matched
        ))?;
        if result.shortfall() > 0 {
            text.line(format_args!(
                "Warning: {} targeted messages were not reached.",
                result.shortfall()
            ))?;
        }
        Ok(())
    }

    fn stats(&mut self, filters: &FilterArgs, scan_limit: Option<usize>, top: usize) -> Result<()> {
        let options = filters.to_options()?;
        build_query(&options)?;
        let mailbox = (self.connect)()?;

        let result = sender_stats(
            &mailbox,
            &StatsRequest {
                options,
                scan_limit: scan_limit.unwrap_or(self.config.default_scan_limit),
                top,
            },
        )?;
        self.emit_json(&result)?;

        let mut table = Table::new(["Sender", "Count"]).title("Top senders").right_align(1);
        for sender in &result.top_senders {
            table.row([sender.sender.clone(), sender.count.to_string()]);
        }
        let mut text = self.text();
        text.table(&table)?;
        text.line(format_args!("\nScanned: {}", result.scanned))?;
        if let (Some(oldest), Some(newest)) = (&result.oldest, &result.newest) {
            text.line(format_args!("Oldest: {oldest}"))?;
            text.line(format_args!("Newest: {newest}"))?;
        }
        Ok(())
    }

    fn show_config(&mut self, init: bool) -> Result<()> {
        if init {
            let path = AppConfig::write_template(false)?;
            log::info!("Config template at {}", path.display());
        }
        let cfg = AppConfig::load()?;
        let path = AppConfig::path();
        self.emit_json(&serde_json::json!({ "path": path, "config": cfg }))?;

        let mut text = self.text();
        match path {
            Some(path) => text.line(format_args!("Config file: {}", path.display()))?,
            None => text.line("Config file: <no config directory>")?,
        }
        text.line(format_args!("default_target_label: {}", cfg.default_target_label))?;
        text.line(format_args!("max_trash_without_force: {}", cfg.max_trash_without_force))?;
        text.line(format_args!("default_export_limit: {}", cfg.default_export_limit))?;
        text.line(format_args!("default_scan_limit: {}", cfg.default_scan_limit))?;
        text.line(format_args!("default_sample: {}", cfg.default_sample))?;
        Ok(())
    }

    fn doctor(&mut self) -> Result<()> {
        let show = |path: Option<std::path::PathBuf>| {
            path.map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unknown>".to_string())
        };
        let config_dir = show(config::config_dir());
        let credentials_path = show(GmailCredentials::default_credentials_path());
        let token_path = show(GmailAuth::default_token_path().ok());
        let available = GmailCredentials::is_available();
        self.emit_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "config_dir": config_dir,
            "credentials_path": credentials_path,
            "token_path": token_path,
            "credentials_available": available,
            "scopes": [GMAIL_MODIFY_SCOPE],
        }))?;

        let mut text = self.text();
        text.line(format_args!("OS: {} {}", std::env::consts::OS, std::env::consts::ARCH))?;
        text.line(format_args!("App data dir:\n  {config_dir}"))?;
        text.line(format_args!("credentials.json: {credentials_path}"))?;
        text.line(format_args!("token.json: {token_path}"))?;
        text.line(format_args!(
            "Credentials available: {}",
            if available { "yes" } else { "no" }
        ))?;
        text.line(format_args!("Scopes:\n  - {GMAIL_MODIFY_SCOPE}"))?;
        Ok(())
    }
}

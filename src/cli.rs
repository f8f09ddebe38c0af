//! The `batch-mailer` command line.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;

use crate::{
    configuration::Settings,
    dispatch::{
        AbortReason, DispatchEvent, QuotaConfirmation, QuotaDecision, QuotaWarning, RunConfig,
        RunReport, RunStatus, RunSummary,
    },
    domain::{Message, Recipient},
    resolve::{self, ManualRecipients},
    startup::Application,
    store::{AuditLog, DeliveryStatus},
};

/// Read before prompting for the sender's password.
pub const PASSWORD_ENV: &str = "BATCH_MAILER_PASSWORD";

/// Send personalized emails in paced batches within a daily limit
#[derive(Parser, Debug)]
#[command(name = "batch-mailer")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a message to a list of recipients
    ///
    /// With the SMTP transport the sender's password is taken from
    /// BATCH_MAILER_PASSWORD, or asked for without echo.
    Send(SendArgs),
    /// Show how many emails a sender has sent today
    Quota {
        /// Sender address (defaults to the configured sender)
        #[arg(long)]
        sender: Option<String>,
    },
    /// Print the log of send attempts
    History {
        /// Only show the most recent entries
        #[arg(long)]
        last: Option<usize>,
    },
    /// List the available message templates
    Templates,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Sender address (defaults to the configured sender)
    #[arg(long)]
    pub sender: Option<String>,

    /// Id of a template from the templates file
    #[arg(long, conflicts_with_all = ["subject", "body"])]
    pub template: Option<u32>,

    /// Subject of a custom message
    #[arg(long, requires = "body")]
    pub subject: Option<String>,

    /// Body of a custom message; `{name}` is replaced per recipient
    #[arg(long, requires = "subject")]
    pub body: Option<String>,

    #[command(flatten)]
    pub recipients: RecipientSource,

    /// File to attach (repeatable)
    #[arg(long = "attach")]
    pub attachments: Vec<PathBuf>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub pause_seconds: Option<u64>,

    #[arg(long)]
    pub daily_limit: Option<u64>,

    /// Go over the daily limit without asking
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct RecipientSource {
    /// CSV file with `email` and `name` columns
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// JSON array of `{"email", "name"}` records
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Inline list: "email:name, email:name"
    #[arg(long)]
    pub to: Option<String>,
}

impl RecipientSource {
    fn resolve(&self) -> anyhow::Result<Vec<Recipient>> {
        if let Some(path) = &self.csv {
            return Ok(resolve::load_csv(path)?);
        }
        if let Some(path) = &self.json {
            return Ok(resolve::load_json(path)?);
        }
        if let Some(input) = &self.to {
            let ManualRecipients {
                recipients,
                rejected,
            } = resolve::parse_manual(input);
            for pair in rejected {
                println!("Ignoring malformed recipient: {}", pair);
            }
            return Ok(recipients);
        }
        bail!("no recipient source given")
    }
}

impl SendArgs {
    fn message(&self, settings: &Settings) -> anyhow::Result<Message> {
        let attachments = self.attachments.clone();
        match (&self.template, &self.subject, &self.body) {
            (Some(id), _, _) => {
                let templates = resolve::load_templates(&settings.storage.templates_path)?;
                let template = resolve::find_template(&templates, *id)
                    .with_context(|| format!("there is no template with id {}", id))?;
                Ok(template.clone().into_message(attachments))
            }
            (None, Some(subject), Some(body)) => {
                Ok(Message::new(subject.clone(), body.clone()).with_attachments(attachments))
            }
            _ => bail!("choose a message with --template or with --subject and --body"),
        }
    }

    fn run_config(&self, settings: &Settings) -> RunConfig {
        let mut config = RunConfig::from(&settings.dispatch);
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(pause_seconds) = self.pause_seconds {
            config.pause = std::time::Duration::from_secs(pause_seconds);
        }
        if let Some(daily_limit) = self.daily_limit {
            config.daily_limit = daily_limit;
        }
        config
    }
}

pub async fn run(cli: Cli, configuration: Settings) -> anyhow::Result<()> {
    let app = Application::build(configuration)?;
    match cli.command {
        Command::Send(args) => send(&app, args).await,
        Command::Quota { sender } => quota(&app, sender).await,
        Command::History { last } => history(&app, last).await,
        Command::Templates => templates(&app),
    }
}

async fn send(app: &Application, args: SendArgs) -> anyhow::Result<()> {
    let message = args.message(app.settings())?;
    let recipients = args.recipients.resolve()?;
    println!("Loaded {} recipients", recipients.len());

    let sender = app.sender(args.sender.clone());
    let credentials = credentials(app, &sender).await?;
    let config = args.run_config(app.settings());
    let request = app.request(Some(sender), credentials, message, recipients, config);

    let confirmation: Arc<dyn QuotaConfirmation> = if args.yes {
        Arc::new(QuotaDecision::Proceed)
    } else {
        Arc::new(TerminalPrompt)
    };

    let mut handle = app.dispatcher().spawn(request, confirmation);

    let cancel = handle.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Stopping after the current recipient...");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        if let Some(line) = describe_event(&event, args.yes) {
            println!("{}", line);
        }
    }

    match handle.join().await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            if let Some(summary) = e.summary() {
                println!("Stopped early. {}", summary_line(summary));
            }
            Err(e.into())
        }
    }
}

/// The password from the environment, a hidden prompt for SMTP, or `None`
/// to use the configured API token.
async fn credentials(app: &Application, sender: &str) -> anyhow::Result<Option<SecretString>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Some(SecretString::from(password)));
    }
    if !app.needs_sender_password() {
        return Ok(None);
    }

    let prompt = format!("Password for {}", sender);
    let password = tokio::task::spawn_blocking(move || {
        dialoguer::Password::new().with_prompt(prompt).interact()
    })
    .await?
    .context("couldn't read the sender's password")?;
    Ok(Some(SecretString::from(password)))
}

/// The interactive prompt already shows the quota warning, so the event is
/// only printed when the warning was confirmed up front.
fn describe_event(event: &DispatchEvent, confirmed_up_front: bool) -> Option<String> {
    let line = match event {
        DispatchEvent::QuotaExceeded(warning) => {
            if !confirmed_up_front {
                return None;
            }
            format!("Warning: {}. Continuing (--yes).", warning)
        }
        DispatchEvent::BatchStarted { batch, size } => {
            format!("Sending batch {} ({} emails)", batch, size)
        }
        DispatchEvent::Attempted {
            position,
            email,
            status,
        } => match status {
            DeliveryStatus::Sent => format!("  [{}] sent to {}", position, email),
            DeliveryStatus::Failed { reason } => {
                format!("  [{}] failed for {}: {}", position, email, reason)
            }
        },
        DispatchEvent::CounterNotUpdated { email, reason } => format!(
            "  sent to {} but the daily counter could not be updated: {}",
            email, reason
        ),
        DispatchEvent::BatchFinished { sent_today, .. } => {
            format!("Emails sent today: {}", sent_today)
        }
    };
    Some(line)
}

fn print_report(report: &RunReport) {
    match &report.status {
        RunStatus::Completed => println!("Done."),
        RunStatus::Aborted(AbortReason::QuotaWarning(_)) => {
            println!("Nothing was sent: the daily limit was not confirmed.")
        }
        RunStatus::Aborted(AbortReason::Cancelled) => println!("Cancelled."),
    }
    println!("{}", summary_line(&report.summary));
}

fn summary_line(summary: &RunSummary) -> String {
    format!(
        "Attempted {}, sent {}, failed {}. Emails sent today: {}.",
        summary.attempted, summary.sent, summary.failed, summary.final_counter_value
    )
}

async fn quota(app: &Application, sender: Option<String>) -> anyhow::Result<()> {
    let (sender, sent) = app.sent_today(sender).await?;
    let limit = app.settings().dispatch.daily_limit;
    println!(
        "{} has sent {} of {} emails today ({} remaining)",
        sender,
        sent,
        limit,
        limit.saturating_sub(sent)
    );
    Ok(())
}

async fn history(app: &Application, last: Option<usize>) -> anyhow::Result<()> {
    let entries = app.audit_log().entries().await?;
    let skip = last.map_or(0, |n| entries.len().saturating_sub(n));
    for entry in entries.iter().skip(skip) {
        println!(
            "{}  {}  {}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.email,
            entry.subject,
            entry.status
        );
    }
    Ok(())
}

fn templates(app: &Application) -> anyhow::Result<()> {
    let templates = resolve::load_templates(&app.settings().storage.templates_path)?;
    for template in templates {
        println!("{}. {}", template.id, template.subject);
    }
    Ok(())
}

/// Asks on the terminal whether to go over the daily limit.
struct TerminalPrompt;

#[async_trait]
impl QuotaConfirmation for TerminalPrompt {
    async fn confirm(&self, warning: &QuotaWarning) -> bool {
        let prompt = format!("{}. Continue?", warning);
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(proceed)) => proceed,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "couldn't read the answer, not continuing");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "prompt task failed, not continuing");
                false
            }
        }
    }
}

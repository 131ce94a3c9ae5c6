//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use outreach_core::PipelineState;
use outreach_core::classify::{self, InboundKind};
use outreach_shared::{
    AppConfig, EmailDraft, Lead, LeadId, LeadStatus, SendKind, init_config, load_config,
    load_config_from, validate_sender,
};
use outreach_storage::{DocumentStore, export_leads, import_leads};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Outreach: a local lead pipeline with an opt-out blocklist.
#[derive(Parser)]
#[command(
    name = "outreach",
    version,
    about = "Manage outreach leads, drafts, send schedules and the opt-out blocklist.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.outreach/outreach.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Inspect and edit leads.
    Leads {
        #[command(subcommand)]
        action: LeadsAction,
    },

    /// List leads whose initial email is due a follow-up.
    FollowUps {
        /// Whole days without a reply (defaults to [follow_up] threshold_days).
        #[arg(long)]
        days: Option<i64>,
    },

    /// Add an address (and its domain) to the opt-out blocklist.
    Block {
        email: String,

        #[arg(long, default_value = "manual")]
        reason: String,
    },

    /// Remove an address from the blocklist.
    Unblock {
        /// Address, or a bare domain with --domain.
        target: String,

        /// Unblock a whole domain.
        #[arg(long)]
        domain: bool,
    },

    /// Check whether an address may be contacted.
    Check { email: String },

    /// List blocked addresses and domains.
    Blocklist,

    /// List deferred sends.
    Scheduled {
        /// Only entries due now.
        #[arg(long)]
        due: bool,

        /// Drop entries that were already sent.
        #[arg(long)]
        prune: bool,
    },

    /// Classify an inbound message as reply, bounce or unsubscribe.
    Classify {
        #[arg(long, default_value = "")]
        subject: String,

        body: String,
    },

    /// Write all leads to a JSON file.
    Export { path: PathBuf },

    /// Merge leads from a JSON file, skipping known addresses.
    Import { path: PathBuf },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum LeadsAction {
    /// List leads in identification order.
    List {
        /// Only leads with this status (e.g. emailSent).
        #[arg(long)]
        status: Option<LeadStatus>,
    },

    /// Show one lead with its drafts.
    Show { id: LeadId },

    /// Add a lead by hand.
    Add {
        name: String,
        email: String,

        #[arg(long, default_value = "")]
        company: String,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        phone: String,

        #[arg(long, default_value = "")]
        linkedin: String,

        /// Background handed to the drafting service.
        #[arg(long)]
        research: Option<String>,
    },

    /// Approve the current draft.
    Approve {
        id: LeadId,

        #[arg(long)]
        follow_up: bool,
    },

    /// Defer a send until the given time.
    Schedule {
        id: LeadId,

        /// RFC 3339 timestamp, e.g. 2026-11-02T09:00:00Z.
        #[arg(long)]
        at: DateTime<Utc>,

        #[arg(long)]
        follow_up: bool,
    },

    /// Delete an unsent draft.
    DeleteDraft {
        id: LeadId,

        #[arg(long)]
        follow_up: bool,
    },

    /// Remove a lead and its scheduled sends.
    Remove { id: LeadId },

    /// Set the status by hand.
    SetStatus { id: LeadId, status: LeadStatus },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "outreach=info",
        1 => "outreach=debug",
        _ => "outreach=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
        Command::Classify { subject, body } => cmd_classify(&subject, &body),
        command => {
            let config = load(config_path.as_deref())?;
            let mut state = open_state(&config)?;
            run_on_state(command, &config, &mut state)
        }
    }
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn open_state(config: &AppConfig) -> Result<PipelineState> {
    let root = config.storage.resolved_data_dir()?;
    let store = DocumentStore::open(&root)?;
    Ok(PipelineState::open(store)?)
}

fn kind(follow_up: bool) -> SendKind {
    if follow_up {
        SendKind::FollowUp
    } else {
        SendKind::Initial
    }
}

fn run_on_state(command: Command, config: &AppConfig, state: &mut PipelineState) -> Result<()> {
    match command {
        Command::Leads { action } => run_leads(action, state),
        Command::FollowUps { days } => {
            let days = days.unwrap_or(config.follow_up.threshold_days);
            let due = state.follow_ups_needed(days, Utc::now());
            if due.is_empty() {
                println!("No follow-ups due ({days} day threshold).");
            }
            for lead in &due {
                let sent = lead
                    .date_email_sent
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!("{}  sent {sent}  {} <{}>", lead.id, lead.name, lead.email);
            }
            Ok(())
        }
        Command::Block { email, reason } => {
            if state.block(&email, &reason) {
                println!("Blocked {email} and its domain.");
            } else {
                println!("{email} was already blocked.");
            }
            Ok(())
        }
        Command::Unblock { target, domain } => {
            let removed = if domain {
                state.unblock_domain(&target)
            } else {
                state.unblock(&target)
            };
            if removed {
                println!("Unblocked {target}.");
            } else {
                println!("{target} was not on the blocklist.");
            }
            if !domain && state.gate().is_blocked(&target) {
                println!("Note: its domain is still blocked; use --domain to lift it.");
            }
            Ok(())
        }
        Command::Check { email } => {
            let clearance = state.can_send(&email);
            if clearance.allowed {
                println!("{email}: allowed");
            } else {
                println!("{email}: blocked ({})", clearance.reason);
            }
            Ok(())
        }
        Command::Blocklist => {
            let gate = state.gate();
            for email in gate.blocked_emails() {
                println!("email   {email}");
            }
            for domain in gate.blocked_domains() {
                println!("domain  {domain}");
            }
            Ok(())
        }
        Command::Scheduled { due, prune } => {
            if prune {
                let pruned = state.prune_sent_schedule();
                println!("Pruned {pruned} sent entries.");
            }
            let now = Utc::now();
            let entries: Vec<_> = if due {
                state.due_scheduled(now)
            } else {
                state.scheduled().iter().collect()
            };
            for entry in entries {
                let name = state.lead(&entry.lead_id).map_or("(removed)", |l| l.name.as_str());
                let mark = if entry.sent { "sent" } else { "pending" };
                println!(
                    "{}  {:<9} {:<8} {}  {name}",
                    entry.scheduled_date.format("%Y-%m-%d %H:%M"),
                    entry.kind.to_string(),
                    mark,
                    entry.lead_id
                );
            }
            Ok(())
        }
        Command::Export { path } => {
            export_leads(&path, state.leads())?;
            info!(path = %path.display(), count = state.leads().len(), "leads exported");
            println!("Exported {} leads to {}", state.leads().len(), path.display());
            Ok(())
        }
        Command::Import { path } => {
            let leads = import_leads(&path)?;
            let total = leads.len();
            let added = state.merge_leads(leads);
            println!("Imported {added} of {total} leads from {}", path.display());
            Ok(())
        }
        Command::Config { .. } | Command::Classify { .. } => {
            Err(eyre!("command does not operate on pipeline state"))
        }
    }
}

fn run_leads(action: LeadsAction, state: &mut PipelineState) -> Result<()> {
    match action {
        LeadsAction::List { status } => {
            let leads: Vec<&Lead> = state
                .leads()
                .iter()
                .filter(|l| status.is_none_or(|s| l.status == s))
                .collect();
            for lead in &leads {
                println!(
                    "{}  {:<16} {} <{}>  {}",
                    lead.id,
                    lead.status.as_str(),
                    lead.name,
                    lead.email,
                    lead.company
                );
            }
            println!("{} lead(s)", leads.len());
        }
        LeadsAction::Show { id } => {
            let lead = state
                .lead(&id)
                .ok_or_else(|| eyre!("no lead with id {id}"))?;
            print_lead(lead);
        }
        LeadsAction::Add {
            name,
            email,
            company,
            title,
            phone,
            linkedin,
            research,
        } => {
            let lead = Lead {
                title,
                phone,
                linkedin_url: linkedin,
                research_summary: research,
                ..Lead::manual(name, company, email)
            };
            let id = state.add_lead(lead)?;
            println!("Added lead {id}");
        }
        LeadsAction::Approve { id, follow_up } => {
            state.approve(&id, kind(follow_up))?;
            println!("Approved {} draft for {id}", kind(follow_up));
        }
        LeadsAction::Schedule { id, at, follow_up } => {
            state.defer_send(&id, kind(follow_up), at)?;
            println!("Scheduled {} send for {id} at {at}", kind(follow_up));
        }
        LeadsAction::DeleteDraft { id, follow_up } => {
            state.delete_draft(&id, kind(follow_up))?;
            println!("Deleted {} draft for {id}", kind(follow_up));
        }
        LeadsAction::Remove { id } => {
            let lead = state.remove_lead(&id)?;
            println!("Removed {} <{}>", lead.name, lead.email);
        }
        LeadsAction::SetStatus { id, status } => {
            state.set_status(&id, status)?;
            println!("{id} is now {status}");
        }
    }
    Ok(())
}

fn print_lead(lead: &Lead) {
    println!("  ID:        {}", lead.id);
    println!("  Name:      {}", lead.name);
    println!("  Company:   {}", lead.company);
    println!("  Email:     {}", lead.email);
    println!("  Status:    {}", lead.status);
    println!("  Delivery:  {:?}", lead.delivery_status);
    if let Some(at) = lead.scheduled_send_date {
        println!("  Scheduled: {at}");
    }
    if lead.has_reply() {
        println!("  Reply:     {}", lead.reply_received);
    }
    print_draft("Draft", lead.drafted_email.as_ref());
    print_draft("Follow-up", lead.follow_up_email.as_ref());
}

fn print_draft(label: &str, draft: Option<&EmailDraft>) {
    let Some(draft) = draft else {
        return;
    };
    let state = match (draft.is_sent(), draft.is_approved) {
        (true, _) => "sent",
        (false, true) => "approved",
        (false, false) => "pending approval",
    };
    println!();
    println!("  {label} ({state}): {}", draft.subject);
    for line in draft.body.lines() {
        println!("    {line}");
    }
}

fn cmd_classify(subject: &str, body: &str) -> Result<()> {
    let kind = match classify::classify(subject, body) {
        InboundKind::Unsubscribe => "unsubscribe",
        InboundKind::Bounce => "bounce",
        InboundKind::Reply => "reply",
    };
    println!("{kind}");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    if let Err(e) = validate_sender(&config.sender) {
        eprintln!("warning: {e}");
    }
    Ok(())
}

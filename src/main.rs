mod api;
mod bulk;
mod config;
mod controller;
mod dashboard;
mod form;
mod logging;
mod models;
mod notify;
mod resources;
mod session;
mod text;
mod tui;

use anyhow::{Context, Result, anyhow, bail};
use api::{Backend, HttpBackend};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crate::config::Settings;
use controller::{ControllerError, Outcome, ResourceList, SortOrder};
use form::{EditDialog, FieldKind, FormError};
use models::{Apply, Picture};
use resources::{Resource, SnippetKind, fetch_list, fetch_one};
use serde_json::Value;
use session::{AuthError, AuthGuard, COOKIE_KEY, Identity, SessionStore};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use text::{format_date_display, strip_html, truncate};

#[derive(Parser)]
#[command(name = "jobquest-admin")]
#[command(about = "Admin console for the SDU-JobQuest job board")]
struct Cli {
    /// Also write log events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ResourceKind {
    Users,
    Companies,
    Jobs,
    Applies,
    Follows,
    Saves,
    Fields,
    Provinces,
    Lookup,
    Pictures,
    Posts,
}

/// Runs `$body` with `$r` bound to the model type behind `$kind`.
macro_rules! with_resource {
    ($kind:expr, $r:ident => $body:expr) => {
        match $kind {
            ResourceKind::Users => {
                type $r = models::User;
                $body
            }
            ResourceKind::Companies => {
                type $r = models::Company;
                $body
            }
            ResourceKind::Jobs => {
                type $r = models::Job;
                $body
            }
            ResourceKind::Applies => {
                type $r = models::Apply;
                $body
            }
            ResourceKind::Follows => {
                type $r = models::Follow;
                $body
            }
            ResourceKind::Saves => {
                type $r = models::Save;
                $body
            }
            ResourceKind::Fields => {
                type $r = models::Field;
                $body
            }
            ResourceKind::Provinces => {
                type $r = models::Province;
                $body
            }
            ResourceKind::Lookup => {
                type $r = models::LookupItem;
                $body
            }
            ResourceKind::Pictures => {
                type $r = models::Picture;
                $body
            }
            ResourceKind::Posts => {
                type $r = models::Post;
                $body
            }
        }
    };
}

#[derive(Args)]
struct ListArgs {
    /// Case-insensitive text search
    #[arg(short, long)]
    search: Option<String>,

    /// Sort order (default, a-z, z-a)
    #[arg(long, default_value = "default")]
    sort: SortOrder,

    /// Job status (pending, approved, rejected)
    #[arg(long)]
    status: Option<String>,

    /// Company province
    #[arg(long)]
    province: Option<String>,

    /// Company size
    #[arg(long)]
    scale: Option<String>,
}

#[derive(Args)]
struct FormValues {
    /// Field value as NAME=VALUE (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Upload a file into an attachment field as NAME=PATH (repeatable)
    #[arg(long = "attach", value_name = "NAME=PATH")]
    attach: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in as an administrator
    Login {
        email: String,

        /// Password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in identity
    Whoami,

    /// List records of a resource
    List {
        resource: ResourceKind,

        #[command(flatten)]
        args: ListArgs,
    },

    /// Show one record
    Show { resource: ResourceKind, id: i64 },

    /// Describe the edit form of a resource
    Form { resource: ResourceKind },

    /// Create a record
    Add {
        resource: ResourceKind,

        #[command(flatten)]
        values: FormValues,
    },

    /// Update a record
    Edit {
        resource: ResourceKind,
        id: i64,

        #[command(flatten)]
        values: FormValues,
    },

    /// Delete a record
    Delete {
        resource: ResourceKind,
        id: i64,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Approve a pending job
    Approve {
        id: i64,

        #[arg(short, long)]
        yes: bool,
    },

    /// Reject a pending job
    Reject {
        id: i64,

        #[arg(short, long)]
        yes: bool,
    },

    /// Bulk actions on applications
    Applies {
        #[command(subcommand)]
        command: AppliesCommands,
    },

    /// Print a picture as a link or an <img> snippet
    PictureSnippet {
        id: i64,

        /// Emit an <img> tag instead of the bare URL
        #[arg(long)]
        html: bool,

        #[arg(long, default_value = "300")]
        width: u32,

        #[arg(long, default_value = "200")]
        height: u32,
    },

    /// List company-size choices from the lookup catalog
    LookupOptions,

    /// Print dashboard statistics
    Stats,

    /// Browse a resource interactively
    Browse {
        resource: ResourceKind,

        /// Initial search term
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Interactive dashboard
    Dashboard,
}

#[derive(Subcommand)]
enum AppliesCommands {
    /// Email the applicants of the given applications
    Mail {
        /// Application IDs
        #[arg(required = true)]
        ids: Vec<i64>,

        #[arg(short, long)]
        subject: String,

        #[arg(short, long)]
        content: String,
    },

    /// Hide applications from the list
    Hide {
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Download the CVs of the given applications
    Cvs {
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let interactive = matches!(cli.command, Commands::Browse { .. } | Commands::Dashboard);
    logging::init_logging(&settings, cli.verbose && !interactive)?;

    let store = SessionStore::open(&settings)?;
    let backend = HttpBackend::new(&settings)?;
    if let Some(cookie) = store.get_item(COOKIE_KEY)? {
        backend.restore_cookie(&cookie);
    }

    match cli.command {
        Commands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password: ")?,
            };
            match session::login(&backend, &store, &email, &password) {
                Ok(account) => {
                    store.remember_cookie(backend.session_cookie().as_deref())?;
                    println!("Signed in as {}.", Identity::User(account).display_name());
                }
                Err(AuthError::Rejected(message)) => bail!(message),
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Logout => match session::logout(&backend, &store) {
            Ok(()) => println!("Signed out."),
            Err(AuthError::Rejected(message)) => {
                println!("Signed out locally ({}).", message);
            }
            Err(e) => return Err(e.into()),
        },

        Commands::Whoami => {
            let identity = require_login(&store)?;
            println!("{} ({})", identity.display_name(), identity.kind());
            println!("Session stored in {}", store.path().display());
        }

        command => {
            require_login(&store)?;
            run(command, &settings, &backend)?;
        }
    }

    Ok(())
}

fn require_login(store: &SessionStore) -> Result<Identity> {
    match AuthGuard::new(store).check() {
        Ok(identity) => Ok(identity),
        Err(AuthError::LoginRequired) => {
            bail!("Login required. Run `jobquest-admin login <email>` first.")
        }
        Err(e) => Err(e.into()),
    }
}

fn run(command: Commands, settings: &Settings, backend: &dyn Backend) -> Result<()> {
    match command {
        Commands::List { resource, args } => {
            with_resource!(resource, R => list_records::<R>(backend, &args))
        }

        Commands::Show { resource, id } => {
            with_resource!(resource, R => show_record::<R>(backend, settings, id))
        }

        Commands::Form { resource } => with_resource!(resource, R => describe_form::<R>(backend)),

        Commands::Add { resource, values } => {
            with_resource!(resource, R => save_record::<R>(backend, settings, None, &values))
        }

        Commands::Edit { resource, id, values } => {
            with_resource!(resource, R => save_record::<R>(backend, settings, Some(id), &values))
        }

        Commands::Delete { resource, id, yes } => with_resource!(resource, R => {
            let mut list = ResourceList::<R>::new(backend);
            let outcome = list.delete(id, &mut confirmer(yes))?;
            report(&mut list, outcome)
        }),

        Commands::Approve { id, yes } => {
            let mut list = ResourceList::<models::Job>::new(backend);
            let outcome = list.approve(id, &mut confirmer(yes))?;
            report(&mut list, outcome)
        }

        Commands::Reject { id, yes } => {
            let mut list = ResourceList::<models::Job>::new(backend);
            let outcome = list.reject(id, &mut confirmer(yes))?;
            report(&mut list, outcome)
        }

        Commands::Applies { command } => {
            let applies: Vec<Apply> = fetch_list(backend, None)?;
            match command {
                AppliesCommands::Mail { ids, subject, content } => {
                    let picked = bulk::selected(&applies, &ids);
                    let sent = bulk::send_bulk_email(backend, &picked, &subject, &content)?;
                    println!("Email sent to {} address(es).", sent);
                }
                AppliesCommands::Hide { ids, yes } => {
                    match bulk::hide_applies(backend, &ids, &mut confirmer(yes))? {
                        Some(hidden) => println!("Hid {} application(s).", hidden),
                        None => println!("Cancelled."),
                    }
                }
                AppliesCommands::Cvs { ids, dir } => {
                    let picked = bulk::selected(&applies, &ids);
                    let saved = bulk::download_cvs(backend, &picked, &settings.asset_base(), &dir)?;
                    for path in &saved {
                        println!("  {}", path.display());
                    }
                    println!("Downloaded {} CV(s).", saved.len());
                }
            }
            Ok(())
        }

        Commands::PictureSnippet { id, html, width, height } => {
            let picture: Picture = fetch_one(backend, id)?
                .ok_or_else(|| anyhow!("Picture #{} not found", id))?;
            let kind = if html { SnippetKind::Html } else { SnippetKind::Link };
            println!(
                "{}",
                resources::picture_snippet(&picture, &settings.api_url, kind, width, height)
            );
            Ok(())
        }

        Commands::LookupOptions => {
            println!("{:<20} {:<30}", "VALUE", "LABEL");
            println!("{}", "-".repeat(51));
            for (value, label) in resources::scale_options(backend) {
                println!("{:<20} {:<30}", truncate(&value, 18), truncate(&label, 28));
            }
            Ok(())
        }

        Commands::Stats => print_stats(backend),

        Commands::Browse { resource, search } => {
            with_resource!(resource, R => tui::run_browse::<R>(backend, search.as_deref()))
        }

        Commands::Dashboard => tui::run_dashboard(backend),

        Commands::Login { .. } | Commands::Logout | Commands::Whoami => Ok(()),
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Asks on stdin unless `--yes` was given.
fn confirmer(yes: bool) -> impl FnMut(&str) -> bool {
    move |question: &str| {
        if yes {
            return true;
        }
        prompt(&format!("{} [y/N] ", question))
            .map(|answer| matches!(answer.trim(), "y" | "Y" | "yes"))
            .unwrap_or(false)
    }
}

fn report<R: Resource>(list: &mut ResourceList<'_, R>, outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Done => {
            for note in list.notifier().pending() {
                println!("[{}] {}", note.severity.as_str(), note.message);
            }
            Ok(())
        }
        Outcome::Declined => {
            println!("Cancelled.");
            Ok(())
        }
        Outcome::Failed(message) => bail!(message),
    }
}

fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let header: Vec<String> = headers.iter().map(|h| h.to_uppercase()).collect();
    println!("{}", line(&header));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + widths.len().saturating_sub(1)));
    for row in rows {
        println!("{}", line(row));
    }
}

fn list_records<R: Resource>(backend: &dyn Backend, args: &ListArgs) -> Result<()> {
    let mut list = ResourceList::<R>::new(backend);
    let status = match args.status.as_deref() {
        Some(s) => Some(
            resources::parse_job_status(s).ok_or_else(|| anyhow!("Unknown status '{}'", s))?,
        ),
        None => None,
    };
    list.set_status(status)?;
    list.set_search(args.search.as_deref().unwrap_or(""));
    list.set_facet("province", args.province.as_deref());
    list.set_facet("scale", args.scale.as_deref());
    list.set_sort(args.sort);

    let view = list.view();
    if view.is_empty() {
        println!("No {} found.", R::NAME);
        return Ok(());
    }
    let rows: Vec<Vec<String>> = view.iter().map(|record| record.row()).collect();
    print_table(R::headers(), &rows);
    if view.len() < list.items().len() {
        println!("\n{} of {} shown", view.len(), list.items().len());
    }
    Ok(())
}

fn show_record<R: Resource>(backend: &dyn Backend, settings: &Settings, id: i64) -> Result<()> {
    let record: R = fetch_one(backend, id)?.ok_or_else(|| anyhow!("{} #{} not found", R::TITLE, id))?;
    println!("{} #{}", R::TITLE, record.id());

    let Value::Object(fields) = serde_json::to_value(&record)? else {
        return Ok(());
    };
    for (key, value) in fields {
        let text = match value {
            Value::Null => continue,
            Value::String(s) if s.trim().is_empty() => continue,
            Value::String(s) if key.starts_with("avatar") => settings.avatar_url(Some(&s)),
            Value::String(s) if key.to_lowercase().contains("date") || key.ends_with("_at") || key.ends_with("At") => {
                format_date_display(&s)
            }
            Value::String(s) => strip_html(&s),
            Value::Array(items) => items
                .iter()
                .map(notify::message_from_value)
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        };
        if text.contains('\n') || text.chars().count() > 60 {
            println!("\n--- {} ---\n{}", key, textwrap::fill(&text, 80));
        } else {
            println!("{}: {}", key, text);
        }
    }
    Ok(())
}

fn describe_form<R: Resource>(backend: &dyn Backend) -> Result<()> {
    let schema = R::schema();
    if schema.is_empty() {
        println!("{} records are read-only.", R::TITLE);
        return Ok(());
    }
    println!("{:<18} {:<22} {:<11} {:<4} {:<12}", "NAME", "LABEL", "KIND", "REQ", "DEFAULT");
    println!("{}", "-".repeat(71));
    for spec in schema {
        println!(
            "{:<18} {:<22} {:<11} {:<4} {:<12}",
            spec.name,
            truncate(spec.label, 20),
            spec.kind.name(),
            if spec.required { "yes" } else { "" },
            truncate(spec.default, 12)
        );
        if let Some(choices) = spec.kind.choices() {
            for (value, label) in choices {
                println!("    {} = {}", value, label);
            }
        }
        if let FieldKind::Reference(source) = &spec.kind {
            let options = form::load_options(backend, source);
            for (value, label) in options.iter().take(10) {
                println!("    {} = {}", value, truncate(label, 40));
            }
            if options.len() > 10 {
                println!("    ... {} more", options.len() - 10);
            }
        }
    }
    Ok(())
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim(), v))
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'", raw))
}

fn save_record<R: Resource>(
    backend: &dyn Backend,
    settings: &Settings,
    id: Option<i64>,
    values: &FormValues,
) -> Result<()> {
    let mut dialog = match id {
        Some(id) => {
            let record: R =
                fetch_one(backend, id)?.ok_or_else(|| anyhow!("{} #{} not found", R::TITLE, id))?;
            EditDialog::edit(&record)
        }
        None => EditDialog::create::<R>(),
    };

    for raw in &values.set {
        let (name, value) = split_pair(raw)?;
        dialog.set(name, value)?;
    }
    for raw in &values.attach {
        let (name, path) = split_pair(raw)?;
        if !dialog.attach(backend, name, &PathBuf::from(path), &settings.asset_base())? {
            println!("Upload of {} failed; {} left unchanged.", path, name);
        }
    }

    let mut list = ResourceList::<R>::new(backend);
    match list.submit(&mut dialog) {
        Ok(_) if dialog.is_open() => {
            bail!(dialog.banner().unwrap_or("Operation failed").to_string())
        }
        Ok(outcome) => report(&mut list, outcome),
        Err(ControllerError::Form(FormError::Invalid(count))) => {
            eprintln!("{}:", dialog.heading());
            for spec in dialog.fields() {
                if let Some(problem) = dialog.error(spec.name) {
                    eprintln!("  {} ({}): {}", spec.label, spec.name, problem);
                }
            }
            bail!("{} field(s) need attention", count)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_stats(backend: &dyn Backend) -> Result<()> {
    let stats = dashboard::fetch_stats(backend)
        .map_err(|e| anyhow!(e.user_message("Failed to load statistics")))?;

    println!("{:<16} {:>10} {:>9}", "METRIC", "TOTAL", "CHANGE");
    println!("{}", "-".repeat(37));
    for card in dashboard::summary(&stats)
        .into_iter()
        .chain(dashboard::job_health(&stats).into_iter().skip(1))
    {
        let change = if card.percent != 0.0 { format!("{:+.1}%", card.percent) } else { "-".to_string() };
        println!("{:<16} {:>10} {:>9}", card.title, card.value, change);
    }

    let monthly = dashboard::monthly_comparison(&stats, 4);
    if !monthly.months.is_empty() {
        println!("\n{:<10} {:>8} {:>10} {:>8} {:>8}", "MONTH", "USERS", "COMPANIES", "JOBS", "APPLIES");
        println!("{}", "-".repeat(48));
        for (i, month) in monthly.months.iter().enumerate() {
            println!(
                "{:<10} {:>8} {:>10} {:>8} {:>8}",
                month, monthly.users[i], monthly.companies[i], monthly.jobs[i], monthly.applies[i]
            );
        }
    }

    let daily = dashboard::daily_window(&stats, chrono::Local::now().date_naive(), 7);
    println!("\n{:<7} {:>6} {:>6} {:>10}", "DAY", "JOBS", "USERS", "COMPANIES");
    println!("{}", "-".repeat(32));
    for (i, label) in daily.labels.iter().enumerate() {
        println!(
            "{:<7} {:>6} {:>6} {:>10}",
            label, daily.jobs.values[i], daily.users.values[i], daily.companies.values[i]
        );
    }
    println!(
        "{:<7} {:>6} {:>6} {:>10}",
        "total",
        daily.jobs.total(),
        daily.users.total(),
        daily.companies.total()
    );
    for series in daily.series() {
        if let Some(day) = series.peak() {
            println!("Busiest day for {}: {} ({})", series.name.to_lowercase(), daily.labels[day], series.values[day]);
        }
    }

    for (title, points) in [("FIELD", &stats.jobs_by_field), ("PROVINCE", &stats.jobs_by_province)] {
        let top = dashboard::top_n(points, 7);
        if top.is_empty() {
            continue;
        }
        println!("\n{:<24} {:>6} {:>6}", title, "JOBS", "SHARE");
        println!("{}", "-".repeat(38));
        for share in top {
            println!("{:<24} {:>6} {:>5.0}%", truncate(&share.label, 22), share.value, share.share);
        }
    }

    if !stats.expiring_jobs_list.is_empty() {
        println!("\n{:<30} {:<20} {:<11} {:>5} {:<8}", "EXPIRING JOB", "COMPANY", "DEADLINE", "DAYS", "URGENCY");
        println!("{}", "-".repeat(78));
        for job in &stats.expiring_jobs_list {
            println!(
                "{:<30} {:<20} {:<11} {:>5} {:<8}",
                truncate(job.name_job.as_deref().unwrap_or(""), 28),
                truncate(job.name_company.as_deref().unwrap_or(""), 18),
                format_date_display(job.deadline.as_deref().unwrap_or("")),
                job.days_left,
                dashboard::urgency(job.days_left).label()
            );
        }
    }
    Ok(())
}

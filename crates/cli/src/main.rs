use anyhow::Context;
use campaign_core::backends::{AccountsFile, LocalBackend};
use campaign_core::config::{default_device_id, page_size_from_env_value};
use campaign_core::export::{export_file_name, visits_to_csv};
use campaign_core::intake::demographics::DemographicsForm;
use campaign_core::intake::staging::KvStaging;
use campaign_core::intake::vitals::VitalsForm;
use campaign_core::theme::{cycle_theme, load_theme};
use campaign_core::{
    AccessGate, CampaignConfig, FieldErrors, FileKeyValueStore, GateDecision, IntakeError,
    IntakeStage, IntakeWorkflow, Location, SessionManager, SignInService, Site, SubmitOutcome,
    SystemClock, VisitQuery, VisitStore, DEFAULT_DATA_DIR,
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "campaign")]
#[command(about = "Health campaign visit intake CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and start a site session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Name to show for this site instead of the directory name
        #[arg(long)]
        site_name: Option<String>,
    },
    /// Sign out and clear the site session
    Logout,
    /// Show the current session and intake step
    Status,
    /// Submit the demographics step
    Demographics(DemographicsArgs),
    /// Submit the vitals step and record the visit
    Vitals(VitalsArgs),
    /// Discard staged demographics
    Abandon,
    /// List recorded visits, newest first
    Visits {
        /// Case-insensitive filter on the patient's name
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Export visits as CSV
    Export {
        #[arg(long, short)]
        query: Option<String>,
        /// Directory to write the export into
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
    /// Show or cycle the theme preference
    Theme {
        #[arg(long)]
        cycle: bool,
    },
    /// Add an operator account to the accounts file, or reset its password
    AddAccount {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        site_id: String,
        #[arg(long)]
        site_name: Option<String>,
        #[arg(long)]
        location_id: Option<String>,
        #[arg(long)]
        campaign_id: Option<String>,
    },
}

#[derive(Args)]
struct DemographicsArgs {
    #[arg(long)]
    given_name: String,
    #[arg(long)]
    father_name: String,
    #[arg(long)]
    grandfather_name: String,
    /// Male or Female
    #[arg(long)]
    sex: String,
    /// Age in whole years
    #[arg(long)]
    age: String,
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    sub_city: Option<String>,
    #[arg(long)]
    woreda: String,
    #[arg(long)]
    phone: Option<String>,
}

impl DemographicsArgs {
    fn into_form(self) -> DemographicsForm {
        let mut form = DemographicsForm::default();
        if let Some(region) = self.region {
            form.set_region(&region);
        }
        if let Some(sub_city) = self.sub_city {
            form.sub_city_or_zone = sub_city;
        }
        form.given_name = self.given_name;
        form.father_name = self.father_name;
        form.grandfather_name = self.grandfather_name;
        form.sex = self.sex;
        form.age_years = self.age;
        form.woreda = self.woreda;
        form.phone = self.phone.unwrap_or_default();
        form
    }
}

#[derive(Args)]
struct VitalsArgs {
    #[arg(long)]
    systolic: String,
    #[arg(long)]
    diastolic: String,
    /// Left or Right
    #[arg(long)]
    arm: Option<String>,
    /// Free-text arm description, used instead of --arm
    #[arg(long, conflicts_with = "arm")]
    arm_other: Option<String>,
    /// Sitting or Standing
    #[arg(long)]
    position: Option<String>,
    /// Time of the BP reading, HH:MM
    #[arg(long)]
    bp_time: String,
    /// Glucose in mg/dL
    #[arg(long)]
    glucose: Option<String>,
    /// HH:MM
    #[arg(long)]
    last_meal_time: Option<String>,
    #[arg(long)]
    pulse: String,
    #[arg(long)]
    temperature: String,
    #[arg(long)]
    spo2: Option<String>,
    #[arg(long)]
    height: Option<String>,
    #[arg(long)]
    weight: String,
    /// May be repeated
    #[arg(long = "consultation")]
    consultations: Vec<String>,
}

impl VitalsArgs {
    fn into_form(self) -> VitalsForm {
        let mut form = VitalsForm {
            bp_systolic: self.systolic,
            bp_diastolic: self.diastolic,
            bp_time: self.bp_time,
            glucose_value: self.glucose.unwrap_or_default(),
            last_meal_time: self.last_meal_time.unwrap_or_default(),
            pulse_rate: self.pulse,
            temperature_c: self.temperature,
            spo2: self.spo2.unwrap_or_default(),
            height_cm: self.height.unwrap_or_default(),
            weight_kg: self.weight,
            ..VitalsForm::default()
        };
        if let Some(arm) = self.arm {
            form.bp_arm = arm;
        }
        if let Some(other) = self.arm_other {
            form.include_arm_preset = false;
            form.bp_arm_other = other;
        }
        if let Some(position) = self.position {
            form.bp_position = position;
        }
        for consultation in &self.consultations {
            form.select_consultation(consultation);
        }
        form
    }
}

impl Commands {
    /// Route guarded by the access gate, or `None` for commands that never need a session.
    fn route(&self) -> Option<&'static str> {
        match self {
            Commands::Login { .. } => Some("/login"),
            Commands::Logout | Commands::Theme { .. } | Commands::AddAccount { .. } => None,
            Commands::Status => Some("/"),
            Commands::Demographics(_) | Commands::Abandon => Some("/intake/demographics"),
            Commands::Vitals(_) => Some("/intake/vitals"),
            Commands::Visits { .. } => Some("/admin"),
            Commands::Export { .. } => Some("/admin/export"),
        }
    }
}

fn config_from_env() -> anyhow::Result<CampaignConfig> {
    let data_dir = std::env::var("CAMPAIGN_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let device_id = std::env::var("CAMPAIGN_DEVICE_ID")
        .unwrap_or_else(|_| default_device_id("campaign-cli", env!("CARGO_PKG_VERSION")));
    let page_size = page_size_from_env_value(std::env::var("CAMPAIGN_PAGE_SIZE").ok())?;
    Ok(CampaignConfig::new(
        PathBuf::from(data_dir),
        device_id,
        page_size,
    )?)
}

fn print_field_errors(errors: &FieldErrors) {
    for (field, message) in errors.iter() {
        eprintln!("  {}: {}", field, message);
    }
}

fn report_intake_error(err: IntakeError) -> anyhow::Error {
    if let Some(errors) = err.field_errors() {
        eprintln!("Please correct the following:");
        print_field_errors(errors);
        return anyhow::anyhow!("validation failed");
    }
    anyhow::anyhow!(err)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("campaign_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'campaign --help' for commands");
        return Ok(());
    };

    let config = config_from_env()?;

    match command {
        Commands::AddAccount {
            email,
            password,
            site_id,
            site_name,
            location_id,
            campaign_id,
        } => add_account(
            &config,
            &email,
            &password,
            site_id,
            site_name,
            location_id,
            campaign_id,
        ),
        command => run(&config, command).await,
    }
}

/// Runs a command against local storage and the local backend, behind the access gate.
async fn run(config: &CampaignConfig, command: Commands) -> anyhow::Result<()> {
    let store = Arc::new(
        FileKeyValueStore::open(config.local_storage_dir())
            .context("failed to open local storage")?,
    );
    let backend = LocalBackend::open(config, Arc::clone(&store))?;
    let sessions = SessionManager::new(Arc::clone(&store));

    if let Some(route) = command.route() {
        if AccessGate::new(&backend, &sessions).evaluate(route).await
            == GateDecision::RedirectToSignIn
        {
            anyhow::bail!("Not signed in or session expired. Run 'campaign login' first.");
        }
    }

    let workflow = IntakeWorkflow::new(
        KvStaging::new(Arc::clone(&store)),
        &backend,
        SystemClock,
        config.device_id(),
    );

    match command {
        Commands::Login {
            email,
            password,
            site_name,
        } => {
            let service = SignInService::new(&backend, &backend, sessions);
            let session = service.sign_in(&email, &password, site_name.as_deref()).await?;
            println!(
                "Signed in at {} (session expires {})",
                session.site_name,
                session.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
            if session.linkage().is_none() {
                println!("Warning: this site has no campaign or location; visits cannot be recorded.");
            }
        }
        Commands::Logout => {
            SignInService::new(&backend, &backend, sessions).logout().await?;
            println!("Signed out.");
        }
        Commands::Status => {
            let Some(session) = sessions.load()? else {
                anyhow::bail!("No active site session.");
            };
            let remaining = sessions.remaining()?;
            println!("Site:      {} ({})", session.site_name, session.site_id);
            println!(
                "Campaign:  {}",
                session.campaign_id.as_deref().unwrap_or("-")
            );
            println!(
                "Location:  {}",
                session.location_id.as_deref().unwrap_or("-")
            );
            println!(
                "Remaining: {}h {:02}m",
                remaining.num_hours(),
                remaining.num_minutes() % 60
            );
            let step = match workflow.stage()? {
                IntakeStage::Demographics => "demographics",
                IntakeStage::Vitals => "vitals",
            };
            println!("Next step: {}", step);
        }
        Commands::Demographics(args) => {
            let record = workflow
                .submit_demographics(&args.into_form())
                .map_err(report_intake_error)?;
            println!(
                "Demographics saved for {} (born {}). Continue with 'campaign vitals'.",
                record.display_name(),
                record.date_of_birth.format("%Y")
            );
        }
        Commands::Vitals(args) => {
            let session = sessions.load()?;
            let outcome = workflow
                .submit_vitals(&args.into_form(), session.as_ref())
                .await
                .map_err(report_intake_error)?;
            match outcome {
                SubmitOutcome::Submitted(visit) => {
                    let row = &visit.row;
                    println!("Visit {} recorded.", visit.id);
                    println!(
                        "BP {} ({}), BMI {} ({})",
                        row.blood_pressure(),
                        row.bp_category,
                        row.bmi.map(|b| b.to_string()).unwrap_or_else(|| "-".into()),
                        row.bmi_category
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "-".into())
                    );
                    if let Some(flag) = row.glucose_flag {
                        println!("Glucose: {}", flag);
                    }
                }
                SubmitOutcome::Ignored => println!("A submission is already in progress."),
            }
        }
        Commands::Abandon => {
            workflow.abandon()?;
            println!("Staged demographics discarded.");
        }
        Commands::Visits { query, page } => {
            let query = VisitQuery::new(query, page, config.page_size());
            let page = backend.query(&query).await?;
            if page.rows.is_empty() {
                println!("No visits found.");
            }
            for visit in &page.rows {
                let row = &visit.row;
                println!(
                    "{}  {} {}  {} {}y  BP {}  {}",
                    visit.created_at.format("%Y-%m-%d %H:%M"),
                    row.full_name,
                    row.father_name,
                    row.sex,
                    row.age_years,
                    row.blood_pressure(),
                    row.site_id
                );
            }
            println!(
                "Page {} of {} ({} total)",
                page.page,
                page.page_count().max(1),
                page.total
            );
        }
        Commands::Export { query, output } => {
            let page = backend.query(&VisitQuery::all(query)).await?;
            let path = output.join(export_file_name(Utc::now()));
            let csv = visits_to_csv(&page.rows)?;
            std::fs::write(&path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported {} visit(s) to {}", page.rows.len(), path.display());
        }
        Commands::Theme { cycle } => {
            let theme = if cycle {
                cycle_theme(&store)?
            } else {
                load_theme(&store)?
            };
            println!("Theme: {}", theme);
        }
        Commands::AddAccount { .. } => anyhow::bail!("add-account runs without a site session"),
    }

    Ok(())
}

fn add_account(
    config: &CampaignConfig,
    email: &str,
    password: &str,
    site_id: String,
    site_name: Option<String>,
    location_id: Option<String>,
    campaign_id: Option<String>,
) -> anyhow::Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        anyhow::bail!("Enter email and password");
    }

    let path = config.accounts_file();
    let mut accounts = AccountsFile::load(&path)?;

    if let Some(location_id) = &location_id {
        accounts.upsert_location(Location {
            id: location_id.clone(),
            campaign_id,
        });
    }
    accounts.upsert_site(Site {
        id: site_id.clone(),
        name: site_name,
        location_id,
    });
    let user_id = accounts.upsert_user(email, password, Some(site_id.clone()));
    accounts.save(&path)?;

    tracing::info!("account {} saved to {}", user_id, path.display());
    println!("Account {} mapped to site {}.", email.trim(), site_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_vitals_with_repeated_consultations() {
        let cli = Cli::try_parse_from([
            "campaign",
            "vitals",
            "--systolic",
            "128",
            "--diastolic",
            "82",
            "--bp-time",
            "09:45",
            "--pulse",
            "76",
            "--temperature",
            "36.8",
            "--weight",
            "70",
            "--consultation",
            "TB screening",
            "--consultation",
            "TB screening",
            "--consultation",
            "Family planning",
        ])
        .expect("arguments should parse");

        let Some(Commands::Vitals(args)) = cli.command else {
            panic!("expected vitals command");
        };
        let form = args.into_form();
        assert_eq!(form.bp_arm, "Left");
        assert!(form.include_arm_preset);
        assert_eq!(form.consultations, ["TB screening", "Family planning"]);
    }

    #[test]
    fn test_arm_other_switches_off_preset() {
        let cli = Cli::try_parse_from([
            "campaign",
            "vitals",
            "--systolic",
            "128",
            "--diastolic",
            "82",
            "--arm-other",
            "Left forearm",
            "--bp-time",
            "09:45",
            "--pulse",
            "76",
            "--temperature",
            "36.8",
            "--weight",
            "70",
        ])
        .expect("arguments should parse");

        let Some(Commands::Vitals(args)) = cli.command else {
            panic!("expected vitals command");
        };
        let form = args.into_form();
        assert!(!form.include_arm_preset);
        assert_eq!(form.bp_arm_other, "Left forearm");
    }

    #[test]
    fn test_demographics_region_switch_clears_default_sub_city() {
        let cli = Cli::try_parse_from([
            "campaign",
            "demographics",
            "--given-name",
            "Abebe",
            "--father-name",
            "Kebede",
            "--grandfather-name",
            "Tesfaye",
            "--sex",
            "Male",
            "--age",
            "42",
            "--region",
            "Oromia",
            "--woreda",
            "03",
        ])
        .expect("arguments should parse");

        let Some(Commands::Demographics(args)) = cli.command else {
            panic!("expected demographics command");
        };
        let form = args.into_form();
        assert_eq!(form.region, "Oromia");
        assert_eq!(form.sub_city_or_zone, "");
        assert_eq!(form.phone, "");
    }

    #[test]
    fn test_only_session_free_commands_skip_the_gate() {
        assert_eq!(Commands::Logout.route(), None);
        assert_eq!(Commands::Theme { cycle: false }.route(), None);
        assert_eq!(Commands::Status.route(), Some("/"));
        assert_eq!(Commands::Abandon.route(), Some("/intake/demographics"));
        assert_eq!(
            Commands::Visits {
                query: None,
                page: 1
            }
            .route(),
            Some("/admin")
        );
    }
}

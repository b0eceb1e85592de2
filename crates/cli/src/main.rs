use clap::{Parser, Subcommand};
use cds_core::{
    ConfigValues, Context, Disposition, FetchOutcome, MessageEvent, MessagePanel, MessageSource,
    OriginAllowList, ReplyEnvelope, SandboxConfig, Session,
};
use fhir::HttpConnector;
use std::io::Read;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cds")]
#[command(about = "CDS sandbox CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the condition codes of a patient
    Conditions {
        /// Patient id (defaults to CDS_PATIENT_ID or the built-in patient)
        patient: Option<String>,
        /// FHIR server base URL (defaults to CDS_FHIR_SERVICE_URL or the built-in server)
        #[arg(long)]
        fhir_url: Option<String>,
    },
    /// Retrieve a patient and their conditions
    Patient {
        /// Patient id (defaults to CDS_PATIENT_ID or the built-in patient)
        patient: Option<String>,
        /// FHIR server base URL
        #[arg(long)]
        fhir_url: Option<String>,
    },
    /// Read a message JSON from stdin and print the reply envelope
    Reply {
        /// Origin the message claims to come from
        #[arg(long)]
        origin: String,
        /// Trusted origin (repeatable; defaults to CDS_TRUSTED_ORIGINS)
        #[arg(long = "trust")]
        trusted: Vec<String>,
    },
}

/// Prints the reply it is given as JSON on stdout.
struct StdoutSource;

impl MessageSource for StdoutSource {
    fn post_message(&self, message: &ReplyEnvelope, _target_origin: &str) {
        match serde_json::to_string_pretty(message) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serialising reply: {}", e),
        }
    }
}

/// A session over HTTP, with `--fhir-url` taking precedence over `CDS_FHIR_SERVICE_URL`.
fn open_session(
    mut values: ConfigValues,
    fhir_url: Option<String>,
) -> Result<Session, Box<dyn std::error::Error>> {
    if fhir_url.is_some() {
        values.fhir_service_url = fhir_url;
    }
    let config = SandboxConfig::from_values(values)?;
    Ok(Session::from_config(config, Arc::new(HttpConnector::new()?))?)
}

fn context_for(config: &SandboxConfig, patient: Option<String>) -> Context {
    Context {
        patient: patient.unwrap_or_else(|| config.default_patient().to_string()),
        base_url: config.default_fhir_service_url().to_string(),
        mock: false,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let values = ConfigValues::from_env();

    match cli.command {
        Some(Commands::Conditions { patient, fhir_url }) => {
            let runtime = tokio::runtime::Runtime::new()?;
            let session = open_session(values, fhir_url)?;
            let context = context_for(session.config(), patient);

            let mut outcomes = session.store().subscribe_diagnostics();
            runtime.block_on(async { session.store().set_context(context).await })?;

            match outcomes.try_recv() {
                Ok(FetchOutcome::Failed { patient, error }) => {
                    eprintln!("Error fetching conditions for {}: {}", patient, error);
                }
                _ => {
                    let state = session.store().get_state();
                    if state.conditions.is_empty() {
                        println!("No conditions found.");
                    }
                    for entry in &state.conditions {
                        let condition = &entry.resource;
                        println!(
                            "{}\t{}\t{}",
                            condition.primary_code().unwrap_or("-"),
                            condition.display().unwrap_or("-"),
                            condition.id.as_deref().unwrap_or("-")
                        );
                    }
                }
            }
            session.close();
        }
        Some(Commands::Patient { patient, fhir_url }) => {
            let runtime = tokio::runtime::Runtime::new()?;
            let session = open_session(values, fhir_url)?;

            match runtime.block_on(session.retrieve_patient(patient.as_deref(), None)) {
                Ok(retrieved) => {
                    let p = &retrieved.patient;
                    println!("ID: {}, Name: {}", p.id, p.display_name());
                    if let Some(birth_date) = &p.birth_date {
                        println!("Born: {}", birth_date);
                    }
                    match retrieved.conditions {
                        Some(bundle) => println!("Conditions: {}", bundle.entry.len()),
                        None => println!("Conditions: unavailable"),
                    }
                }
                Err(e) => eprintln!("Error retrieving patient: {}", e),
            }
            session.close();
        }
        Some(Commands::Reply { origin, trusted }) => {
            let config = SandboxConfig::from_values(values)?;
            let allow_list = if trusted.is_empty() {
                OriginAllowList::new(config.trusted_origins())?
            } else {
                OriginAllowList::new(&trusted)?
            };
            let panel = MessagePanel::new(Arc::new(allow_list));

            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let data = match serde_json::from_str(&input) {
                Ok(value) => value,
                Err(_) => serde_json::Value::String(input.trim_end().to_string()),
            };

            let source = StdoutSource;
            let event = MessageEvent {
                origin: &origin,
                data,
                source: &source,
            };
            if panel.handle_message(event) == Disposition::Rejected {
                eprintln!("Rejected message from untrusted origin: {}", origin);
            }
        }
        None => {
            println!("Use 'cds --help' for commands");
        }
    }

    Ok(())
}

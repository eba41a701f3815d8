use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgMatches, Command};
use motion_core::config::ENV_CONFIG_PATH;
use motion_core::{parse_event, verify_signature, MotionConfig, MotionService};
use motion_ledger::OwnerId;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("Path to the TOML config (defaults to $MOTION_CONFIG)");
    let owner_arg = Arg::new("owner")
        .long("owner")
        .default_value("local")
        .help("Owner id to run as");
    let token_arg = Arg::new("token")
        .long("token")
        .conflicts_with("owner")
        .help("Bearer token resolved through the configured identities");

    Command::new("motion")
        .version(env!("CARGO_PKG_VERSION"))
        .about("PromptMotion: text prompt to rendered animation")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("generate")
                .about("Generate, render and publish an animation from a prompt")
                .arg(Arg::new("prompt").required(true).help("Animation description"))
                .arg(config_arg.clone())
                .arg(owner_arg.clone())
                .arg(token_arg.clone()),
        )
        .subcommand(
            Command::new("render")
                .about("Render and publish a local scene source file")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Scene source defining GeneratedScene"),
                )
                .arg(Arg::new("title").long("title").help("Job title"))
                .arg(config_arg.clone())
                .arg(owner_arg)
                .arg(token_arg),
        )
        .subcommand(
            Command::new("check-config")
                .about("Load and validate the configuration")
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("verify-webhook")
                .about("Verify a billing webhook payload against its signature")
                .arg(
                    Arg::new("payload")
                        .long("payload")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("File holding the raw request body"),
                )
                .arg(
                    Arg::new("signature")
                        .long("signature")
                        .required(true)
                        .help("Hex HMAC-SHA256 from the provider header"),
                )
                .arg(config_arg),
        )
}

fn load_config(args: &ArgMatches) -> anyhow::Result<MotionConfig> {
    let path = args
        .get_one::<PathBuf>("config")
        .cloned()
        .or_else(|| std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from));
    match path {
        Some(path) => MotionConfig::load(&path).with_context(|| format!("loading {}", path.display())),
        None => {
            tracing::debug!("No config file given, using defaults");
            Ok(MotionConfig::new().with_env())
        }
    }
}

async fn resolve_owner(service: &MotionService, args: &ArgMatches) -> anyhow::Result<OwnerId> {
    if let Some(token) = args.get_one::<String>("token") {
        return Ok(service.authenticate(Some(&format!("Bearer {token}"))).await?);
    }
    let owner = args.get_one::<String>("owner").map_or("local", String::as_str);
    Ok(OwnerId::parse(owner)?)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("generate", args)) => {
            let config = load_config(args)?;
            let service = MotionService::from_config(&config)?;
            let owner = resolve_owner(&service, args).await?;
            let prompt = args.get_one::<String>("prompt").map_or("", String::as_str);

            let outcome = service.generate(&owner, prompt).await;
            print_json(&outcome)?;
            std::process::exit(if outcome.is_completed() { 0 } else { 1 });
        }
        Some(("render", args)) => {
            let config = load_config(args)?;
            let service = MotionService::from_config(&config)?;
            let owner = resolve_owner(&service, args).await?;
            let Some(file) = args.get_one::<PathBuf>("file") else {
                bail!("missing scene file");
            };
            let code = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let title = args
                .get_one::<String>("title")
                .cloned()
                .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .unwrap_or_default();

            let outcome = service.submit_code(&owner, &code, &title).await;
            print_json(&outcome)?;
            std::process::exit(if outcome.is_completed() { 0 } else { 1 });
        }
        Some(("check-config", args)) => {
            let config = load_config(args)?;
            config.validate()?;
            print_json(&config)?;
            eprintln!(
                "config OK (model key {}, webhook secret {})",
                if config.generator.api_key.is_some() { "set" } else { "missing" },
                if config.billing.webhook_secret.is_some() { "set" } else { "missing" }
            );
        }
        Some(("verify-webhook", args)) => {
            let config = load_config(args)?;
            let Some(secret) = config.billing.webhook_secret.as_deref() else {
                bail!("MOTION_WEBHOOK_SECRET is not set");
            };
            let Some(payload) = args.get_one::<PathBuf>("payload") else {
                bail!("missing payload file");
            };
            let signature = args.get_one::<String>("signature").map_or("", String::as_str);
            let body = tokio::fs::read(payload)
                .await
                .with_context(|| format!("reading {}", payload.display()))?;

            verify_signature(secret.as_bytes(), &body, signature)?;
            print_json(&parse_event(&body)?)?;
        }
        _ => bail!("unknown subcommand"),
    }

    Ok(())
}

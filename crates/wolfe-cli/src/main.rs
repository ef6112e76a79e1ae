use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::DEFAULT_AUDIT_KEY_ENV;

#[derive(Parser)]
#[command(name = "wolfe")]
#[command(about = "Wolfe HA operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> node...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Encrypted audit log utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Offline key handling for the nuclear resume
    Nuclear {
        #[command(subcommand)]
        cmd: NuclearCmd,
    },

    /// Shared lock service commands (Postgres, WOLFE_DATABASE_URL)
    Ha {
        #[command(subcommand)]
        cmd: HaCmd,
    },

    /// Apply lock-service migrations
    DbMigrate,
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of one day. Exits non-zero unless intact.
    Validate {
        #[arg(long)]
        dir: String,
        /// UTC day, YYYY-MM-DD
        #[arg(long)]
        day: String,
        /// Env var holding the audit key (base64 or hex)
        #[arg(long, default_value = DEFAULT_AUDIT_KEY_ENV)]
        key_env: String,
    },

    /// Decrypt one day and print each record as a JSON line.
    Show {
        #[arg(long)]
        dir: String,
        #[arg(long)]
        day: String,
        #[arg(long, default_value = DEFAULT_AUDIT_KEY_ENV)]
        key_env: String,
    },
}

#[derive(Subcommand)]
enum NuclearCmd {
    /// Generate an Ed25519 signing key file and print the public key.
    Keygen {
        #[arg(long)]
        out: String,
        /// Overwrite an existing key file
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Print the public key for a signing key file.
    Pubkey {
        #[arg(long)]
        key_file: String,
    },

    /// Print the day nonce a resume must sign.
    Nonce {
        #[arg(long, default_value = "Europe/Prague")]
        tz: String,
        /// Override the day (YYYY-MM-DD); default is today in --tz
        #[arg(long)]
        day: Option<String>,
    },

    /// Sign the day nonce with a key file.
    Sign {
        #[arg(long)]
        key_file: String,
        #[arg(long, default_value = "Europe/Prague")]
        tz: String,
        #[arg(long)]
        day: Option<String>,
    },
}

#[derive(Subcommand)]
enum HaCmd {
    /// Write the human split-brain acknowledgement.
    Ack {
        /// Audit directory to record HA_HUMAN_ACK in
        #[arg(long)]
        audit_dir: Option<String>,
        #[arg(long, default_value = DEFAULT_AUDIT_KEY_ENV)]
        key_env: String,
    },

    /// Print the current lease holder and the stored ack.
    Inspect {
        #[arg(long, default_value = "wolfe:ha:lock")]
        lock_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = wolfe_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Validate { dir, day, key_env } => {
                commands::audit::validate(&dir, &day, &key_env)?;
            }
            AuditCmd::Show { dir, day, key_env } => {
                commands::audit::show(&dir, &day, &key_env)?;
            }
        },

        Commands::Nuclear { cmd } => match cmd {
            NuclearCmd::Keygen { out, force } => commands::nuclear::keygen(&out, force)?,
            NuclearCmd::Pubkey { key_file } => commands::nuclear::pubkey(&key_file)?,
            NuclearCmd::Nonce { tz, day } => {
                println!("nonce={}", commands::nonce_for(&tz, day.as_deref())?);
            }
            NuclearCmd::Sign { key_file, tz, day } => {
                commands::nuclear::sign(&key_file, &tz, day.as_deref())?;
            }
        },

        Commands::Ha { cmd } => match cmd {
            HaCmd::Ack { audit_dir, key_env } => {
                // Resolve the audit log first so a bad key never leaves an unaudited ack.
                let audit = commands::ha::ack_audit_log(audit_dir.as_deref(), &key_env)?;
                let svc = wolfe_db::PgLockService::new(wolfe_db::connect_from_env().await?);
                commands::ha::ack(&svc, audit.as_ref()).await?;
            }
            HaCmd::Inspect { lock_key } => {
                let svc = wolfe_db::PgLockService::new(wolfe_db::connect_from_env().await?);
                commands::ha::inspect(&svc, &lock_key).await?;
            }
        },

        Commands::DbMigrate => {
            let pool = wolfe_db::connect_from_env().await?;
            wolfe_db::migrate(&pool).await?;
            println!("migrations_applied=true");
        }
    }

    Ok(())
}

#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Command-line front end for sending notifications and checking login codes

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use notification_mailer::{
    domain::{auth::IdentityProvider, communication::mailer::Mailer},
    infrastructure::{
        email::smtp::{SMTPConfig, SMTPMailer, TransportConfig},
        oauth::wechat::{WeChatClient, WeChatConfig},
    },
};
use tracing::{error, info};

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
#[command(name = "mailer", version, about)]
pub struct Args {
    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send an HTML notification email
    Send {
        /// The SMTP configuration
        #[clap(flatten)]
        smtp: SMTPConfig,

        /// The subject of the email
        #[arg(long)]
        subject: String,

        /// Recipient addresses, separated by `;`
        #[arg(long)]
        to: String,

        /// The HTML body
        #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
        body: Option<String>,

        /// Read the HTML body from a file
        #[arg(long)]
        body_file: Option<PathBuf>,
    },

    /// Exchange a WeChat login code for the user's WeChat id
    VerifyCode {
        /// The WeChat server configuration
        #[clap(flatten)]
        wechat: WeChatConfig,

        /// The login code
        #[arg(long)]
        code: String,
    },
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Failed to load environment: {}", e);
    }

    tracing_subscriber::fmt::init();

    match Args::parse().command {
        Command::Send {
            smtp,
            subject,
            to,
            body,
            body_file,
        } => {
            let html = match (body, body_file) {
                (Some(body), _) => body,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => bail!("either --body or --body-file is required"),
            };

            let config = TransportConfig::from(smtp);
            info!(host = %config.host, port = config.port, strategy = ?config.strategy, "sending email");

            let mailer = SMTPMailer::new(config);

            if let Err(e) = mailer.send_email(&subject, &to, &html).await {
                error!(error = ?e, "failed to send email");
                return Err(e.into());
            }

            info!("email sent");
        }
        Command::VerifyCode { wechat, code } => {
            let client = WeChatClient::new(&wechat)?;
            let identity = client.identity_for_code(&code).await?;

            println!("{identity}");
        }
    }

    Ok(())
}

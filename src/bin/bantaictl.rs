use anyhow::{Context, Result};
use bantai_relay::config;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::{
    io::{self, Read},
    path::PathBuf,
};

/// bantaictl: check configuration and exercise a running bantai-relay.
#[derive(Debug, Parser)]
#[command(name = "bantaictl")]
#[command(version)]
struct Cli {
    /// Base URL for the relay (used by commands that call the HTTP API)
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    url: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print or validate configuration files.
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },

    /// GET /health
    Health,

    /// Classify a message via POST /api/analyze (reads stdin when TEXT is omitted)
    Analyze {
        /// Message to classify
        text: Option<String>,

        /// Guardian address to notify on severe findings
        #[arg(long)]
        parent_email: Option<String>,

        /// Extension view the message came from (main|sidebar)
        #[arg(long, default_value = "main")]
        context: String,

        /// Origin header to send (must match the relay's allowed origin when set)
        #[arg(long)]
        origin: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCmd {
    /// Print a config example to stdout
    Example,

    /// Validate a config file (loads, parses and checks values)
    Validate {
        #[arg(long)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');

    match cli.cmd {
        Cmd::Config { cmd } => handle_config(cmd)?,

        Cmd::Health => {
            let u = format!("{base}/health");
            let txt = reqwest::blocking::get(&u)
                .with_context(|| format!("GET {u}"))?
                .text()
                .context("read response")?;
            println!("{txt}");
        }

        Cmd::Analyze {
            text,
            parent_email,
            context,
            origin,
        } => {
            let text = match text {
                Some(t) => t,
                None => {
                    let mut s = String::new();
                    io::stdin().read_to_string(&mut s).context("read stdin")?;
                    s.trim_end().to_string()
                }
            };

            let u = format!("{base}/api/analyze");
            let mut req = reqwest::blocking::Client::new().post(&u);
            if let Some(o) = origin {
                req = req.header("Origin", o);
            }

            let mut body = serde_json::json!({
                "messageText": text,
                "context": context,
            });
            if let Some(email) = parent_email {
                body["parentEmail"] = Value::String(email);
            }

            let resp = req.json(&body).send().with_context(|| format!("POST {u}"))?;
            let status = resp.status();
            let v: Value = resp.json().context("parse json")?;
            println!("{}", serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string()));
            if !status.is_success() {
                anyhow::bail!("request failed: {status}");
            }
        }
    }

    Ok(())
}

fn handle_config(cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Example => {
            let ex = include_str!("../../config.example.toml");
            print!("{ex}");
            Ok(())
        }
        ConfigCmd::Validate { path } => {
            let _ = config::Config::load(&path).with_context(|| format!("load {path:?}"))?;
            eprintln!("OK: {path:?}");
            Ok(())
        }
    }
}

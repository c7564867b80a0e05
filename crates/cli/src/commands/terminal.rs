//! Terminal command
//!
//! Prompts for credentials, negotiates a session and attaches the local
//! terminal to the container shell.

use anyhow::Result;
use clap::Parser;
use crossterm::event::EventStream;
use devstack_common::TerminalUser;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;

use crate::client::ApiClient;
use crate::config::CliConfig;
use crate::gate::{demo_password, CredentialGate, Credentials, GateState};
use crate::output::{print_error, print_info, print_list, print_success, spinner, OutputFormat, TableDisplay};
use crate::terminal::interactive::{pump, DETACH_HINT};
use crate::terminal::{BridgeOptions, RawTerminal, TerminalBridge};

#[derive(Parser)]
pub struct TerminalArgs {
    /// Container ID
    pub container_id: String,

    /// Username; prompted for when omitted
    #[arg(short, long)]
    pub user: Option<String>,

    /// List the container's demo identities and exit
    #[arg(long)]
    pub list_users: bool,
}

#[derive(Serialize)]
pub struct UserDisplay {
    pub username: String,
    pub description: String,
}

impl From<&TerminalUser> for UserDisplay {
    fn from(user: &TerminalUser) -> Self {
        Self {
            username: user.username.clone(),
            description: user.description.clone(),
        }
    }
}

impl TableDisplay for UserDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Username", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.username.clone(), self.description.clone()]
    }
}

/// Ask for a username and password on the controlling terminal. `None` on
/// end of input.
fn prompt_credentials(default_user: Option<String>) -> io::Result<Option<Credentials>> {
    let mut stdout = io::stdout();
    match &default_user {
        Some(user) => print!("Username [{}]: ", user),
        None => print!("Username: "),
    }
    stdout.flush()?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let username = match line.trim() {
        "" => default_user.unwrap_or_default(),
        typed => typed.to_string(),
    };

    let hint = if demo_password(&username).is_some() {
        " (Enter for the demo password)"
    } else {
        ""
    };
    let password = rpassword::prompt_password(format!("Password{}: ", hint))?;

    Ok(Some(if password.is_empty() {
        Credentials::demo(&username)
    } else {
        Credentials::new(username, password)
    }))
}

pub async fn execute(args: TerminalArgs, client: ApiClient, config: &CliConfig, format: OutputFormat) -> Result<()> {
    let endpoints = client.endpoints().clone();
    let gate = CredentialGate::new(args.container_id.clone(), Arc::new(client));

    let users = gate.demo_identities().await;
    if args.list_users {
        let displays: Vec<UserDisplay> = users.iter().map(UserDisplay::from).collect();
        print_list(&displays, format);
        return Ok(());
    }
    if !users.is_empty() {
        let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
        print_info(&format!("Demo identities: {}", names.join(", ")));
    }

    let mut default_user = args.user.or_else(|| users.first().map(|u| u.username.clone()));
    let session = loop {
        let prompt_default = default_user.clone();
        let Some(credentials) = tokio::task::spawn_blocking(move || prompt_credentials(prompt_default)).await??
        else {
            print_info("Aborted");
            return Ok(());
        };
        if !credentials.username().is_empty() {
            default_user = Some(credentials.username().to_string());
        }

        let progress = spinner("Authenticating...");
        let result = gate.submit(credentials).await;
        progress.finish_and_clear();

        match result {
            Ok(session) => break session,
            Err(e) => match gate.state() {
                GateState::Form { error: Some(message) } => print_error(&message),
                _ => print_error(&e.to_string()),
            },
        }
    };

    print_success(&format!(
        "Authenticated as {} on {}",
        session.username(),
        session.container_id()
    ));
    print_info(DETACH_HINT);

    let options = BridgeOptions {
        connect_timeout: config.request_timeout(),
        propagate_resize: config.terminal.propagate_resize,
    };
    let bridge = TerminalBridge::new(session, &endpoints, RawTerminal::new(), options);
    bridge.connect().await?;
    bridge.resize()?;

    let result = pump(&bridge, EventStream::new()).await;
    bridge.close();
    result?;
    Ok(())
}

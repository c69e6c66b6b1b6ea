//! Tessera CLI - Command line interface.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera CLI - Register, confirm and authenticate users")]
#[command(version)]
struct Cli {
    /// Tessera server address
    #[arg(long, default_value = "http://localhost:8080", env = "TESSERA_ADDR")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user
    Register {
        /// Username
        username: String,
        /// Email address
        #[arg(long)]
        email: String,
        /// Phone number in E.164 format
        #[arg(long)]
        phone: Option<String>,
        /// Password (read from stdin if not provided)
        #[arg(long, env = "TESSERA_PASSWORD")]
        password: Option<String>,
    },
    /// Confirm a registration with the emailed code
    Confirm {
        /// Username
        username: String,
        /// Six digit confirmation code
        code: String,
    },
    /// Resend the confirmation code
    Resend {
        /// Username
        username: String,
    },
    /// Check whether a username is taken
    Taken {
        /// Username
        username: String,
    },
    /// Log in and print the issued tokens
    Login {
        /// Username
        username: String,
        /// Password (read from stdin if not provided)
        #[arg(long, env = "TESSERA_PASSWORD")]
        password: Option<String>,
    },
    /// Check whether a token is valid
    Verify {
        /// Token to check
        #[arg(env = "TESSERA_TOKEN")]
        token: String,
    },
    /// Show the profile of an access token's owner
    Whoami {
        /// Access token
        #[arg(long, env = "TESSERA_ACCESS_TOKEN")]
        token: String,
    },
    /// Check server status
    Status,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    kind: String,
}

#[derive(Serialize)]
struct CreateUserRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    phone_number: &'a str,
}

#[derive(Serialize)]
struct ConfirmRequest<'a> {
    username: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct UsernameRequest<'a> {
    username: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone_number: String,
    confirmed: bool,
    local_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TakenResponse {
    taken: bool,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id_token: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
}

// ============================================================================
// HTTP Client
// ============================================================================

struct TesseraClient {
    client: Client,
    base_url: String,
}

impl TesseraClient {
    fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends `request`; non-success statuses become errors carrying the
    /// server's message.
    async fn send(&self, request: RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let resp = request.send().await.context("Failed to connect to server")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error: ErrorResponse = resp.json().await.unwrap_or(ErrorResponse {
                error: format!("HTTP {status}"),
                kind: "unknown".into(),
            });
            bail!("{action} failed: {} ({})", error.error, error.kind);
        }

        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
        self.send(request, action)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    async fn get_health(&self) -> Result<HealthResponse> {
        self.send_json(self.client.get(self.url("/v1/sys/health")), "Status")
            .await
    }

    async fn register(&self, req: &CreateUserRequest<'_>) -> Result<IdentityResponse> {
        self.send_json(self.client.post(self.url("/v1/users")).json(req), "Register")
            .await
    }

    async fn confirm(&self, username: &str, code: &str) -> Result<IdentityResponse> {
        let req = ConfirmRequest { username, code };
        self.send_json(
            self.client.post(self.url("/v1/users/confirm")).json(&req),
            "Confirm",
        )
        .await
    }

    async fn resend(&self, username: &str) -> Result<()> {
        let req = UsernameRequest { username };
        self.send(self.client.post(self.url("/v1/users/resend")).json(&req), "Resend")
            .await?;
        Ok(())
    }

    async fn taken(&self, username: &str) -> Result<TakenResponse> {
        let path = format!("/v1/users/{username}/taken");
        self.send_json(self.client.get(self.url(&path)), "Check").await
    }

    async fn login(&self, username: &str, password: &str) -> Result<SessionResponse> {
        let req = LoginRequest { username, password };
        self.send_json(self.client.post(self.url("/v1/auth/session")).json(&req), "Login")
            .await
    }

    async fn verify(&self, token: &str) -> Result<VerifyResponse> {
        let req = VerifyRequest { token };
        self.send_json(self.client.post(self.url("/v1/auth/verify")).json(&req), "Verify")
            .await
    }

    async fn whoami(&self, token: &str) -> Result<IdentityResponse> {
        self.send_json(
            self.client.get(self.url("/v1/users/me")).bearer_auth(token),
            "Profile lookup",
        )
        .await
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

fn read_password(password: Option<String>) -> Result<String> {
    let password = match password {
        Some(p) => p,
        None => {
            print!("Password: ");
            io::stdout().flush()?;
            let stdin = io::stdin();
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        },
    };

    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

fn print_identity(identity: &IdentityResponse) {
    println!("  Username:  {}", identity.username);
    if !identity.email.is_empty() {
        println!("  Email:     {}", identity.email);
    }
    if !identity.phone_number.is_empty() {
        println!("  Phone:     {}", identity.phone_number);
    }
    println!("  Confirmed: {}", identity.confirmed);
    if let Some(id) = identity.local_id {
        println!("  Local ID:  {id}");
    }
}

async fn cmd_status(client: &TesseraClient) -> Result<()> {
    let health = client.get_health().await?;

    println!("Tessera server status:");
    println!("  Status:  {}", health.status);
    println!("  Version: {}", health.version);

    Ok(())
}

async fn cmd_register(
    client: &TesseraClient,
    username: &str,
    email: &str,
    phone: Option<&str>,
    password: Option<String>,
) -> Result<()> {
    let password = read_password(password)?;
    let req = CreateUserRequest {
        username,
        email,
        password: &password,
        phone_number: phone.unwrap_or_default(),
    };

    let identity = client.register(&req).await?;

    println!("User registered. A confirmation code has been sent.");
    print_identity(&identity);
    Ok(())
}

async fn cmd_confirm(client: &TesseraClient, username: &str, code: &str) -> Result<()> {
    let identity = client.confirm(username, code).await?;
    println!("User '{}' confirmed", identity.username);
    Ok(())
}

async fn cmd_resend(client: &TesseraClient, username: &str) -> Result<()> {
    client.resend(username).await?;
    println!("Confirmation code resent to '{username}'");
    Ok(())
}

async fn cmd_taken(client: &TesseraClient, username: &str) -> Result<()> {
    let result = client.taken(username).await?;
    if result.taken {
        println!("Username '{username}' is taken");
    } else {
        println!("Username '{username}' is available");
    }
    Ok(())
}

async fn cmd_login(client: &TesseraClient, username: &str, password: Option<String>) -> Result<()> {
    let password = read_password(password)?;
    let result = client.login(username, &password).await?;

    println!("ID Token:      {}", result.id_token);
    println!("Access Token:  {}", result.access_token);
    if let Some(refresh) = &result.refresh_token {
        println!("Refresh Token: {refresh}");
    }
    println!("Expires In:    {}s", result.expires_in);
    Ok(())
}

async fn cmd_verify(client: &TesseraClient, token: &str) -> Result<()> {
    let result = client.verify(token).await?;
    if result.valid {
        println!("Token is valid");
        Ok(())
    } else {
        bail!("Token is not valid")
    }
}

async fn cmd_whoami(client: &TesseraClient, token: &str) -> Result<()> {
    let identity = client.whoami(token).await?;
    println!("Profile:");
    print_identity(&identity);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = TesseraClient::new(&cli.addr)?;

    match cli.command {
        Commands::Status => cmd_status(&client).await,
        Commands::Register {
            username,
            email,
            phone,
            password,
        } => cmd_register(&client, &username, &email, phone.as_deref(), password).await,
        Commands::Confirm { username, code } => cmd_confirm(&client, &username, &code).await,
        Commands::Resend { username } => cmd_resend(&client, &username).await,
        Commands::Taken { username } => cmd_taken(&client, &username).await,
        Commands::Login { username, password } => cmd_login(&client, &username, password).await,
        Commands::Verify { token } => cmd_verify(&client, &token).await,
        Commands::Whoami { token } => cmd_whoami(&client, &token).await,
    }
}

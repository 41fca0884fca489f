//! Voyage checkout from the command line
//!
//! Quotes a booking, opens a checkout session, manages coupons and confirms a
//! payment after the provider redirect. Results are printed as JSON.
//!
//! Configuration comes from the environment (a `.env` file is honoured):
//! `CHECKOUT_API_BASE_URL` is required, see the runtime crate for the rest.
//!
//! ```text
//! voyage-checkout --user-id 5 quote 12
//! voyage-checkout --user-id 5 --role agency pay 12 --description "Ha Long Bay"
//! voyage-checkout --user-id 5 confirm 12 --order-code 1733201
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voyage_checkout_backend::BackendClient;
use voyage_checkout_core::booking::{BookingId, UserId};
use voyage_checkout_core::error::CheckoutError;
use voyage_checkout_core::session::{ActorRole, InMemoryProcessedBookings, ProcessedBookings, Session};
use voyage_checkout_runtime::{CheckoutConfig, CheckoutService, FileProcessedBookings};

/// Exit code when the session has to sign in again
const EXIT_UNAUTHORIZED: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "voyage-checkout", version, about = "Voyage booking checkout")]
struct Cli {
    /// Signed-in user
    #[arg(long, global = true)]
    user_id: Option<i64>,

    /// Role of the signed-in user (customer, agency, host, admin)
    #[arg(long, global = true, default_value = "customer")]
    role: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile the payable amount of a booking
    Quote {
        /// Booking id
        booking_id: i64,
    },
    /// Open a checkout session and print the payment URL
    Pay {
        /// Booking id
        booking_id: i64,
        /// Description shown by the payment provider
        #[arg(long)]
        description: Option<String>,
    },
    /// Apply a coupon code to a booking
    ApplyCoupon {
        /// Booking id
        booking_id: i64,
        /// Coupon code
        code: String,
    },
    /// Remove a coupon from a booking
    RemoveCoupon {
        /// Booking id
        booking_id: i64,
        /// Coupon code; defaults to the one on the booking
        code: Option<String>,
    },
    /// Confirm a payment after the provider redirect
    Confirm {
        /// Booking id
        booking_id: i64,
        /// Order code from the redirect URL
        #[arg(long)]
        order_code: String,
    },
}

impl Cli {
    fn session(&self) -> Session {
        let role = ActorRole::parse(&self.role);
        match self.user_id {
            Some(id) => Session::new(UserId(id), role),
            None => Session {
                role,
                ..Session::anonymous()
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if let Some(checkout) = error.downcast_ref::<CheckoutError>() {
                if checkout.requires_reauthentication() {
                    eprintln!("Your session has expired. Please sign in again and retry.");
                    return ExitCode::from(EXIT_UNAUTHORIZED);
                }
            }
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CheckoutConfig::from_env().context("Failed to load configuration")?;
    debug!(
        api_base_url = %config.api_base_url,
        fallback = ?config.fallback_api_base_url,
        processed_store = ?config.processed_store_path,
        "Loaded configuration"
    );

    let backend = BackendClient::new(config.api_base_url.clone(), config.request_timeout)
        .context("Failed to build the backend client")?
        .with_fallback(config.fallback_api_base_url.clone())
        .with_token(config.api_token.clone());
    let processed: Arc<dyn ProcessedBookings> = match &config.processed_store_path {
        Some(path) => Arc::new(FileProcessedBookings::open(path)),
        None => Arc::new(InMemoryProcessedBookings::new()),
    };
    let service = CheckoutService::new(Arc::new(backend), processed, config.poll_policy());
    let session = cli.session();

    let output = match &cli.command {
        Command::Quote { booking_id } => {
            serde_json::to_value(service.quote(BookingId(*booking_id), &session).await?)?
        },
        Command::Pay {
            booking_id,
            description,
        } => {
            let redirect = service
                .begin_payment(BookingId(*booking_id), &session, description.as_deref())
                .await?;
            info!(booking_id, amount = %redirect.amount, "Checkout session created");
            serde_json::to_value(redirect)?
        },
        Command::ApplyCoupon { booking_id, code } => serde_json::to_value(
            service
                .apply_coupon(BookingId(*booking_id), &session, code)
                .await?,
        )?,
        Command::RemoveCoupon { booking_id, code } => serde_json::to_value(
            service
                .remove_coupon(BookingId(*booking_id), &session, code.as_deref())
                .await?,
        )?,
        Command::Confirm {
            booking_id,
            order_code,
        } => {
            let state = service
                .confirm_payment(BookingId(*booking_id), &session, order_code)
                .await?;
            json!({
                "confirmed": state.phase.is_confirmed(),
                "state": state,
            })
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_build_the_session() {
        let cli = Cli::try_parse_from(["voyage-checkout", "quote", "12", "--user-id", "5", "--role", "Agency"]);
        let session = cli.map(|cli| cli.session()).ok();
        assert_eq!(session, Some(Session::new(UserId(5), ActorRole::Agency)));
    }

    #[test]
    fn anonymous_session_keeps_the_role() {
        let session = Cli::try_parse_from(["voyage-checkout", "--role", "agency", "quote", "1"])
            .map(|cli| cli.session())
            .ok();
        assert_eq!(session.map(|s| (s.user_id, s.role)), Some((None, ActorRole::Agency)));
    }

    #[test]
    fn confirm_requires_an_order_code() {
        assert!(Cli::try_parse_from(["voyage-checkout", "confirm", "12"]).is_err());
        let parsed = Cli::try_parse_from(["voyage-checkout", "confirm", "12", "--order-code", "1733201"]);
        assert!(matches!(
            parsed.map(|cli| cli.command).ok(),
            Some(Command::Confirm { booking_id: 12, .. })
        ));
    }
}

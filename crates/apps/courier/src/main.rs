//! Courier - command-line access to a Gmail mailbox
//!
//! A thin operator tool over the courier-mail driver. Results are printed
//! as JSON.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use courier_mail::{
    DraftId, DriverConfig, EmailAddress, Folder, GmailCredentials, GmailDriver, MailDriver,
    MessageId, ThreadId,
};
use log::{error, info, warn};
use serde::Serialize;

mod session;

use session::{FileSessionInvalidator, SessionToken};

const USAGE: &str = "\
usage: courier <command> [args]

commands:
  login <refresh-token> [email]     store a refresh token for the account
  logout                            revoke the stored token and forget it
  list [folder] [query...]          list threads (inbox, sent, drafts, spam, bin, archive, starred, <label id>)
  get <thread-id>                   show a decoded thread
  drafts [query...]                 list drafts
  draft <draft-id>                  show one draft
  labels                            list labels
  aliases                           list send-as addresses
  read <thread-id>...               mark threads read
  unread <thread-id>...             mark threads unread
  attachment <message-id> <attachment-id> <path>
                                    save an attachment to a file";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let Some((command, rest)) = args.split_first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    match command.as_str() {
        "login" => login(rest),
        "logout" => logout(),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            let driver = connect()?;
            dispatch(&driver, command, rest)
        }
    }
}

fn dispatch(driver: &dyn MailDriver, command: &str, rest: &[String]) -> Result<()> {
    match command {
        "list" => {
            let folder = rest.first().map(|f| Folder::parse(f)).unwrap_or(Folder::Inbox);
            let query = join_query(rest.get(1..));
            print_json(&driver.list(&folder, query.as_deref(), None, None)?)
        }
        "get" => {
            let id = required(rest, 0, "thread id")?;
            print_json(&driver.get(&ThreadId::new(id))?)
        }
        "drafts" => {
            let query = join_query(Some(rest));
            print_json(&driver.list_drafts(query.as_deref(), None, None)?)
        }
        "draft" => {
            let id = required(rest, 0, "draft id")?;
            print_json(&driver.get_draft(&DraftId::new(id))?)
        }
        "labels" => print_json(&driver.get_user_labels()?),
        "aliases" => print_json(&driver.get_email_aliases()?),
        "read" | "unread" => {
            if rest.is_empty() {
                bail!("{} needs at least one thread id", command);
            }
            let ids: Vec<ThreadId> = rest.iter().map(ThreadId::new).collect();
            let report = if command == "read" {
                driver.mark_as_read(&ids)?
            } else {
                driver.mark_as_unread(&ids)?
            };
            if report.failed_count() > 0 {
                warn!("{} of {} threads were not updated", report.failed_count(), ids.len());
            }
            print_json(&report)
        }
        "attachment" => {
            let message_id = required(rest, 0, "message id")?;
            let attachment_id = required(rest, 1, "attachment id")?;
            let path = required(rest, 2, "output path")?;
            let bytes = driver.get_attachment(&MessageId::new(message_id), attachment_id)?;
            std::fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path))?;
            info!("Saved {} bytes to {}", bytes.len(), path);
            Ok(())
        }
        other => bail!("Unknown command {:?}\n\n{}", other, USAGE),
    }
}

fn connect() -> Result<GmailDriver> {
    let credentials = load_credentials()?;
    let session = SessionToken::load()?;
    let config = DriverConfig::load()?;

    let driver = GmailDriver::connect(
        credentials,
        session.refresh_token,
        config,
        Arc::new(FileSessionInvalidator),
    );
    Ok(match session.email {
        Some(email) => driver.with_account(EmailAddress::new(email)),
        None => driver,
    })
}

fn login(rest: &[String]) -> Result<()> {
    let refresh_token = required(rest, 0, "refresh token")?;
    let session = SessionToken {
        refresh_token: refresh_token.to_string(),
        email: rest.get(1).cloned(),
    };
    session.save()?;
    info!("Session saved");
    Ok(())
}

fn logout() -> Result<()> {
    let session = SessionToken::load()?;
    let driver = GmailDriver::connect(
        load_credentials()?,
        session.refresh_token.clone(),
        DriverConfig::load()?,
        Arc::new(FileSessionInvalidator),
    );
    match driver.revoke_refresh_token(&session.refresh_token) {
        Ok(true) => info!("Refresh token revoked"),
        Ok(false) => warn!("Provider did not revoke the token; forgetting it anyway"),
        Err(e) => warn!("Revocation failed ({}); forgetting the token anyway", e),
    }
    SessionToken::remove()
}

fn load_credentials() -> Result<GmailCredentials> {
    GmailCredentials::load().map_err(|e| {
        if let Some(path) = GmailCredentials::default_credentials_path() {
            warn!(
                "To configure Gmail access, either:\n\
                 1. Place your Google OAuth credentials at: {}\n\
                 2. Or set environment variables: GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET",
                path.display()
            );
        }
        e
    })
}

fn required<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("Missing {}\n\n{}", what, USAGE))
}

fn join_query(words: Option<&[String]>) -> Option<String> {
    words.map(|w| w.join(" ")).filter(|q| !q.trim().is_empty())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    blob::SelectedFile, http_client, load_home_feed, load_settings, BackendApi, HttpBackendApi,
    ListingsController, PresetBlobStore, ProfileController, ProfileField, Session, UploadStatus,
};
use shared::domain::{Listing, ListingId, UserId, UserRecord};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "homes", about = "Profile and listings client for the homes backend")]
struct Cli {
    #[arg(long, default_value = "client.toml")]
    config: PathBuf,
    #[command(flatten)]
    session: SessionArgs,
    #[command(subcommand)]
    command: Command,
}

/// Identifies the already signed-in user; signing in happens elsewhere.
#[derive(Args, Debug)]
struct SessionArgs {
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long, default_value = "")]
    username: String,
    #[arg(long, default_value = "")]
    email: String,
    #[arg(long)]
    avatar_url: Option<String>,
}

impl SessionArgs {
    fn into_session(self) -> Session {
        match self.user_id {
            Some(id) => Session::signed_in(UserRecord {
                id: UserId(id),
                username: self.username,
                email: self.email,
                avatar: self.avatar_url,
            }),
            None => Session::default(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Uploads an optional new avatar, applies field edits, and submits them.
    Profile {
        #[arg(long)]
        avatar: Option<PathBuf>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    DeleteAccount,
    SignOut,
    Listings,
    DeleteListing {
        listing_id: String,
    },
    Home,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let settings = load_settings(&cli.config)?;
    info!(
        api = %settings.api_base_url,
        upload = %settings.upload_url(),
        "loaded client settings"
    );
    let http = http_client(&settings)?;
    let api: Arc<dyn BackendApi> =
        Arc::new(HttpBackendApi::from_settings(http.clone(), &settings));
    let profile = ProfileController::new(
        Arc::clone(&api),
        Arc::new(PresetBlobStore::from_settings(http, &settings)),
    )
    .with_max_avatar_bytes(settings.max_avatar_bytes);
    let session = cli.session.into_session();

    match cli.command {
        Command::Profile {
            avatar,
            username,
            email,
            password,
        } => {
            let edits = [
                (ProfileField::Username, username),
                (ProfileField::Email, email),
                (ProfileField::Password, password),
            ];
            run_profile_update(&profile, session, avatar, edits).await?;
        }
        Command::DeleteAccount => {
            let next = profile.delete_account(session).await;
            report_session(&next, "Account deleted")?;
        }
        Command::SignOut => {
            let next = profile.sign_out(session).await;
            report_session(&next, "Signed out")?;
        }
        Command::Listings => {
            let view = ListingsController::new(api).show_listings(&session).await;
            if let Some(err) = view.error() {
                bail!("{err}");
            }
            print_listings("Your listings", view.listings());
        }
        Command::DeleteListing { listing_id } => {
            let controller = ListingsController::new(api);
            let view = controller.delete_listing(&ListingId(listing_id.clone())).await;
            if let Some(err) = view.error() {
                bail!("{err}");
            }
            println!("Deleted listing {listing_id}");
        }
        Command::Home => {
            let feed = load_home_feed(api.as_ref()).await;
            print_listings("Recent offers", &feed.offers);
            print_listings("Recent places for rent", &feed.rentals);
            print_listings("Recent places for sale", &feed.sales);
        }
    }

    Ok(())
}

async fn run_profile_update(
    controller: &ProfileController,
    session: Session,
    avatar: Option<PathBuf>,
    edits: [(ProfileField, Option<String>); 3],
) -> Result<()> {
    if let Some(path) = avatar {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read avatar '{}'", path.display()))?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("avatar")
            .to_string();
        let mime_type = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        let handle = match controller
            .select_file(SelectedFile::new(name, mime_type, bytes))
            .await
        {
            Ok(handle) => handle,
            Err(err) => bail!("{err}"),
        };

        let mut last_reported = 0;
        while !handle.is_finished() {
            let progress = controller.snapshot().await.progress();
            if progress != last_reported && progress < 100 {
                println!("Uploading {progress}%");
                last_reported = progress;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        handle.finished().await;

        match controller.snapshot().await.upload_status() {
            UploadStatus::Uploaded => println!("Image successfully uploaded!"),
            UploadStatus::Failed(message) => bail!("{message}"),
            status => bail!("upload ended in unexpected state {status:?}"),
        }
    }

    for (field, value) in edits {
        if let Some(value) = value {
            controller.set_field(field, value).await;
        }
    }

    let next = controller.submit(session).await;
    report_session(&next, "User is updated successfully!")?;
    if let Some(user) = next.current_user() {
        println!(
            "{} <{}> avatar={}",
            user.username,
            user.email,
            controller.snapshot().await.avatar_display_url(&next)
        );
    }
    Ok(())
}

fn report_session(session: &Session, success: &str) -> Result<()> {
    if let Some(err) = session.error() {
        bail!("{err}");
    }
    println!("{success}");
    Ok(())
}

fn print_listings(title: &str, listings: &[Listing]) {
    println!("{title}:");
    if listings.is_empty() {
        println!("  (none)");
    }
    for listing in listings {
        println!(
            "  {} {} [{}] {}",
            listing.id,
            listing.name,
            listing.kind.as_query_value(),
            listing.cover_image().unwrap_or("-")
        );
    }
}

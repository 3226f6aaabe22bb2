use std::sync::Arc;

use shared::{
    domain::{Listing, ListingId, ListingKind},
    protocol::ListingQuery,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{api::BackendApi, error::ClientError, session::Session};

pub const FETCH_LISTINGS_FAILED: &str = "Error fetching listings";
pub const DELETE_LISTING_FAILED: &str = "Error deleting listing";
pub const HOME_FEED_SECTION_LIMIT: u32 = 4;

/// The signed-in user's own listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingsView {
    listings: Vec<Listing>,
    error: Option<String>,
    loaded: bool,
}

impl ListingsView {
    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

fn failure_message(err: &ClientError, fallback: &str) -> String {
    let message = err.user_message();
    if err.is_rejection() && !message.is_empty() {
        message
    } else {
        fallback.to_string()
    }
}

pub struct ListingsController {
    api: Arc<dyn BackendApi>,
    view: Mutex<ListingsView>,
}

impl ListingsController {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self {
            api,
            view: Mutex::new(ListingsView::default()),
        }
    }

    pub async fn view(&self) -> ListingsView {
        self.view.lock().await.clone()
    }

    pub async fn show_listings(&self, session: &Session) -> ListingsView {
        let Some(user) = session.current_user() else {
            let mut view = self.view.lock().await;
            *view = ListingsView {
                loaded: true,
                ..ListingsView::default()
            };
            return view.clone();
        };

        let result = self.api.user_listings(&user.id).await;
        let mut view = self.view.lock().await;
        *view = match result {
            Ok(listings) => {
                info!(user_id = %user.id, count = listings.len(), "loaded user listings");
                ListingsView {
                    listings,
                    error: None,
                    loaded: true,
                }
            }
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "failed to load user listings");
                ListingsView {
                    listings: Vec::new(),
                    error: Some(failure_message(&err, FETCH_LISTINGS_FAILED)),
                    loaded: true,
                }
            }
        };
        view.clone()
    }

    pub async fn delete_listing(&self, listing_id: &ListingId) -> ListingsView {
        let result = self.api.delete_listing(listing_id).await;
        let mut view = self.view.lock().await;
        match result {
            Ok(ack) => {
                info!(
                    listing_id = %listing_id,
                    reply = ack.message().unwrap_or_default(),
                    "listing deleted"
                );
                view.listings.retain(|listing| &listing.id != listing_id);
            }
            Err(err) => {
                warn!(listing_id = %listing_id, error = %err, "failed to delete listing");
                view.error = Some(failure_message(&err, DELETE_LISTING_FAILED));
            }
        }
        view.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HomeFeed {
    pub offers: Vec<Listing>,
    pub rentals: Vec<Listing>,
    pub sales: Vec<Listing>,
}

/// Loads the three home page sections one after another. A failing section
/// stays empty and does not stop the others.
pub async fn load_home_feed(api: &dyn BackendApi) -> HomeFeed {
    HomeFeed {
        offers: load_section(
            api,
            "offers",
            ListingQuery::offers(HOME_FEED_SECTION_LIMIT),
        )
        .await,
        rentals: load_section(
            api,
            "rentals",
            ListingQuery::of_kind(ListingKind::Rent, HOME_FEED_SECTION_LIMIT),
        )
        .await,
        sales: load_section(
            api,
            "sales",
            ListingQuery::of_kind(ListingKind::Sale, HOME_FEED_SECTION_LIMIT),
        )
        .await,
    }
}

async fn load_section(
    api: &dyn BackendApi,
    section: &'static str,
    query: ListingQuery,
) -> Vec<Listing> {
    match api.listings(&query).await {
        Ok(listings) => listings,
        Err(err) => {
            warn!(section, error = %err, "failed to load home feed section");
            Vec::new()
        }
    }
}

#[cfg(test)]
#[path = "tests/listings_tests.rs"]
mod tests;

use std::sync::Arc;

use campus_swap_client::{ApiClient, Category, ClientError, Listing, ListingDraft, SessionStore};
use rust_decimal::Decimal;

use super::{filter_listings, ListingFilter, LoadState};
use crate::router::Route;

/// Browse screen. Unlike the dashboard, a failed load is an error state.
#[derive(Debug)]
pub struct ProductList {
    api: Arc<ApiClient>,
    state: LoadState<Vec<Listing>>,
    pub filter: ListingFilter,
}

impl ProductList {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            state: LoadState::Loading,
            filter: ListingFilter::default(),
        }
    }

    pub async fn mount(&mut self) {
        self.state = LoadState::Loading;
        self.state = match self.api.list_items().await {
            Ok(listings) => LoadState::Ready(listings),
            Err(e) => {
                tracing::error!(error = %e, "error fetching products");
                LoadState::Error(format!("Failed to load products: {}", e))
            }
        };
    }

    pub fn state(&self) -> &LoadState<Vec<Listing>> {
        &self.state
    }

    /// Distinct categories of the fetched listings, in first-seen order.
    pub fn categories(&self) -> Vec<Category> {
        let mut seen = Vec::new();
        if let LoadState::Ready(listings) = &self.state {
            for listing in listings {
                if !seen.contains(&listing.category) {
                    seen.push(listing.category);
                }
            }
        }
        seen
    }

    pub fn clear_filters(&mut self) {
        self.filter.clear();
    }

    pub fn visible(&self) -> Vec<&Listing> {
        match &self.state {
            LoadState::Ready(listings) => filter_listings(listings, &self.filter),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ProductDetail {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    id: String,
    state: LoadState<Listing>,
}

impl ProductDetail {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionStore>, id: impl Into<String>) -> Self {
        Self {
            api,
            session,
            id: id.into(),
            state: LoadState::Loading,
        }
    }

    pub async fn mount(&mut self) {
        self.state = LoadState::Loading;
        self.state = match self.api.get_item(&self.id).await {
            Ok(listing) => LoadState::Ready(listing),
            Err(e) => {
                tracing::error!(id = %self.id, error = %e, "error fetching product");
                LoadState::Error(e.to_string())
            }
        };
    }

    pub fn state(&self) -> &LoadState<Listing> {
        &self.state
    }

    /// True when the signed-in user is the listing's seller.
    pub fn is_owner(&self) -> bool {
        match (self.state.data(), self.session.user()) {
            (Some(listing), Some(user)) => listing.is_owned_by(&user),
            _ => false,
        }
    }

    /// Route to chat with the seller, when the seller is known by id.
    pub fn contact_seller(&self) -> Option<Route> {
        let seller_id = self.state.data()?.seller.as_ref()?.id.clone()?;
        Some(Route::Chat(seller_id))
    }

    /// Remove the listing. Only the owning seller may do this.
    pub async fn delete(&self) -> Result<Route, ClientError> {
        if !self.is_owner() {
            return Err(ClientError::validation("You can only delete your own listings"));
        }
        self.api.delete_item(&self.id).await?;
        Ok(Route::Products)
    }
}

/// Create or edit form for a listing.
#[derive(Debug)]
pub struct ProductForm {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    editing: Option<String>,
    pub draft: ListingDraft,
}

impl ProductForm {
    pub fn create(api: Arc<ApiClient>, session: Arc<SessionStore>) -> Self {
        Self {
            api,
            session,
            editing: None,
            draft: ListingDraft {
                title: String::new(),
                description: String::new(),
                price: Decimal::ZERO,
                category: Category::Electronics,
                condition: "new".into(),
                images: Vec::new(),
            },
        }
    }

    /// Edit form prefilled from `listing`; fails unless the signed-in user
    /// owns it.
    pub fn edit(
        api: Arc<ApiClient>,
        session: Arc<SessionStore>,
        listing: &Listing,
    ) -> Result<Self, ClientError> {
        let owned = session.user().is_some_and(|u| listing.is_owned_by(&u));
        if !owned {
            return Err(ClientError::validation("You can only edit your own listings"));
        }
        Ok(Self {
            api,
            session,
            editing: Some(listing.id.clone()),
            draft: ListingDraft::from(listing),
        })
    }

    pub fn is_edit(&self) -> bool {
        self.editing.is_some()
    }

    /// Validate and save; returns the detail route of the saved listing.
    pub async fn submit(&self) -> Result<Route, ClientError> {
        if !self.session.is_authenticated() {
            return Err(ClientError::validation("You must be logged in to create a listing"));
        }
        self.draft.validate()?;
        let saved = match &self.editing {
            Some(id) => self.api.update_item(id, &self.draft).await?,
            None => self.api.create_item(&self.draft).await?,
        };
        tracing::info!(id = %saved.id, "listing saved");
        Ok(Route::Product(saved.id))
    }
}

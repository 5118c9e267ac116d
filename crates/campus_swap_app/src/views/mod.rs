//! Screen models. Each one fetches its data on `mount` and exposes a
//! [`LoadState`]; rendering is left to the caller.

mod auth;
mod chat;
mod dashboard;
mod products;
mod profile;

pub use auth::{LoginForm, RegisterForm};
pub use chat::{ChatView, ConversationsView};
pub use dashboard::{placeholder_listings, Dashboard, FALLBACK_NOTICE};
pub use products::{ProductDetail, ProductForm, ProductList};
pub use profile::{ProfileView, PROFILE_SAVED};

use campus_swap_client::{Category, Listing};

/// Three-state load status of a screen.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Loading,
    Error(String),
    Ready(T),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            LoadState::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Error(message) => Some(message),
            _ => None,
        }
    }
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        LoadState::Loading
    }
}

/// Client-side listing filter: category (`None` is "all") and a search string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub category: Option<Category>,
    pub search: String,
}

impl ListingFilter {
    /// Category match AND case-insensitive substring of `search` in the title
    /// or description.
    pub fn matches(&self, listing: &Listing) -> bool {
        if self.category.is_some_and(|c| c != listing.category) {
            return false;
        }
        let needle = self.search.to_lowercase();
        needle.is_empty()
            || listing.title.to_lowercase().contains(&needle)
            || listing.description.to_lowercase().contains(&needle)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

pub fn filter_listings<'a>(listings: &'a [Listing], filter: &ListingFilter) -> Vec<&'a Listing> {
    listings.iter().filter(|l| filter.matches(l)).collect()
}

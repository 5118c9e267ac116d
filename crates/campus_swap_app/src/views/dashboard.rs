use std::sync::Arc;

use campus_swap_client::models::{ListingStats, SellerRef};
use campus_swap_client::{ApiClient, Category, Listing};
use rust_decimal::Decimal;

use super::{filter_listings, ListingFilter, LoadState};

pub const FALLBACK_NOTICE: &str = "Failed to load items. Using placeholder data instead.";

/// Home screen: every listing, filterable. Falls back to a fixed placeholder
/// set when the backend cannot be reached.
#[derive(Debug)]
pub struct Dashboard {
    api: Arc<ApiClient>,
    state: LoadState<Vec<Listing>>,
    notice: Option<String>,
    pub filter: ListingFilter,
}

impl Dashboard {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            state: LoadState::Loading,
            notice: None,
            filter: ListingFilter::default(),
        }
    }

    pub async fn mount(&mut self) {
        self.state = LoadState::Loading;
        match self.api.list_items().await {
            Ok(listings) => {
                self.notice = None;
                self.state = LoadState::Ready(listings);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load items, showing placeholders");
                self.notice = Some(FALLBACK_NOTICE.to_string());
                self.state = LoadState::Ready(placeholder_listings());
            }
        }
    }

    pub fn state(&self) -> &LoadState<Vec<Listing>> {
        &self.state
    }

    /// Inline message shown above the grid, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn set_category(&mut self, category: Option<Category>) {
        self.filter.category = category;
    }

    pub fn set_search(&mut self, search: &str) {
        self.filter.search = search.to_string();
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

struct Placeholder {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    price: Decimal,
    category: Category,
    image: &'static str,
    seller: &'static str,
    rating: f64,
    reviews: u64,
    condition: &'static str,
}

pub fn placeholder_listings() -> Vec<Listing> {
    let rows = [
        Placeholder {
            id: "1",
            title: "MacBook Pro 2019",
            description: "Barely used MacBook Pro with 16GB RAM and 512GB SSD. Perfect for coding and design work.",
            price: Decimal::new(89900, 2),
            category: Category::Electronics,
            image: "https://placehold.co/400x300/1e293b/a1a1aa?text=MacBook+Pro",
            seller: "Alex Kim",
            rating: 4.8,
            reviews: 24,
            condition: "Like New",
        },
        Placeholder {
            id: "2",
            title: "Calculus Textbook",
            description: "Calculus: Early Transcendentals 8th Edition. Required for Calc 101. Minimal highlighting.",
            price: Decimal::new(4500, 2),
            category: Category::Books,
            image: "https://placehold.co/400x300/1e293b/a1a1aa?text=Textbook",
            seller: "Jamie Chen",
            rating: 4.6,
            reviews: 12,
            condition: "Good",
        },
        Placeholder {
            id: "3",
            title: "Mini Fridge",
            description: "Compact 3.2 cu ft mini fridge. Perfect for dorm rooms. Energy efficient and quiet operation.",
            price: Decimal::new(7500, 2),
            category: Category::Furniture,
            image: "https://placehold.co/400x300/1e293b/a1a1aa?text=Mini+Fridge",
            seller: "Taylor Wong",
            rating: 4.9,
            reviews: 18,
            condition: "Excellent",
        },
        Placeholder {
            id: "4",
            title: "Mechanical Keyboard",
            description: "Keychron K2 mechanical keyboard with RGB backlight and Brown switches. Great for typing and gaming.",
            price: Decimal::new(6000, 2),
            category: Category::Electronics,
            image: "https://placehold.co/400x300/1e293b/a1a1aa?text=Keyboard",
            seller: "Jordan Lee",
            rating: 4.7,
            reviews: 9,
            condition: "Like New",
        },
        Placeholder {
            id: "5",
            title: "Desk Lamp",
            description: "LED desk lamp with adjustable brightness and color temperature. USB charging port included.",
            price: Decimal::new(2850, 2),
            category: Category::Furniture,
            image: "https://placehold.co/400x300/1e293b/a1a1aa?text=Desk+Lamp",
            seller: "Morgan Smith",
            rating: 4.5,
            reviews: 15,
            condition: "Excellent",
        },
        Placeholder {
            id: "6",
            title: "Psychology Textbook",
            description: "Psychology: An Introduction 12th Edition. Perfect condition, no markings.",
            price: Decimal::new(3800, 2),
            category: Category::Books,
            image: "https://placehold.co/400x300/1e293b/a1a1aa?text=Psychology",
            seller: "Casey Johnson",
            rating: 4.8,
            reviews: 7,
            condition: "Like New",
        },
    ];
    rows.into_iter()
        .map(|p| Listing {
            id: p.id.to_string(),
            title: p.title.to_string(),
            description: p.description.to_string(),
            price: p.price,
            category: p.category,
            condition: Some(p.condition.to_string()),
            images: vec![p.image.to_string()],
            seller: Some(SellerRef {
                id: None,
                name: Some(p.seller.to_string()),
            }),
            created_at: None,
            stats: ListingStats {
                views: 0,
                rating: Some(p.rating),
                reviews: p.reviews,
            },
        })
        .collect()
}

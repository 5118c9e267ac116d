//! Application wiring: one session, one REST client and one realtime channel,
//! shared by every screen and the router.

use std::sync::Arc;
use std::time::Duration;

use campus_swap_client::{
    ApiClient, ClientError, Config, Listing, RealtimeChannel, SessionStore, User,
};

use crate::router::{Navigation, Route, Router};
use crate::views::{
    ChatView, ConversationsView, Dashboard, LoginForm, ProductDetail, ProductForm, ProductList,
    ProfileView, RegisterForm,
};

#[derive(Debug)]
pub struct App {
    config: Config,
    session: Arc<SessionStore>,
    api: Arc<ApiClient>,
    channel: Arc<RealtimeChannel>,
    router: Router,
}

impl App {
    /// Build from config, persisting the session at `config.session_path()`.
    pub fn from_config(config: Config) -> Result<Self, ClientError> {
        let session = match config.session_path() {
            Some(path) => SessionStore::open_file(path)?,
            None => {
                tracing::warn!("no home directory, session will not be persisted");
                SessionStore::in_memory()
            }
        };
        Self::new(config, Arc::new(session))
    }

    pub fn new(config: Config, session: Arc<SessionStore>) -> Result<Self, ClientError> {
        let api = Arc::new(ApiClient::from_config(&config, session.clone())?);
        let channel = Arc::new(RealtimeChannel::from_config(&config, session.clone()));
        Ok(Self::with_parts(config, session, api, channel))
    }

    /// Assemble from prebuilt parts; all of them must share `session`.
    pub fn with_parts(
        config: Config,
        session: Arc<SessionStore>,
        api: Arc<ApiClient>,
        channel: Arc<RealtimeChannel>,
    ) -> Self {
        let router = Router::new(session.clone());
        Self {
            config,
            session,
            api,
            channel,
            router,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn channel(&self) -> &Arc<RealtimeChannel> {
        &self.channel
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }

    pub fn navigate(&mut self, path: &str) -> Navigation {
        self.router.navigate(path)
    }

    /// Log in and return the landing route (the one that bounced to login,
    /// else the dashboard).
    pub async fn login(&mut self, form: &LoginForm) -> Result<Route, ClientError> {
        let user = form.submit(&self.api, &self.session).await?;
        tracing::info!(user_id = %user.id, "logged in");
        self.api.clear_cache();
        Ok(self.router.take_return_route())
    }

    pub async fn register(&mut self, form: &RegisterForm) -> Result<Route, ClientError> {
        let user = form.submit(&self.api, &self.session).await?;
        tracing::info!(user_id = %user.id, "registered");
        self.api.clear_cache();
        Ok(self.router.take_return_route())
    }

    /// Close the channel, drop cached reads and forget the session.
    pub fn logout(&mut self) -> Result<Route, ClientError> {
        self.channel.disconnect();
        self.api.clear_cache();
        self.session.clear_session()?;
        Ok(Route::Login)
    }

    /// How long chat screens wait for the channel to come up.
    pub fn connect_timeout(&self) -> Duration {
        self.config.request_timeout()
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::new(self.api.clone())
    }

    pub fn product_list(&self) -> ProductList {
        ProductList::new(self.api.clone())
    }

    pub fn product_detail(&self, id: &str) -> ProductDetail {
        ProductDetail::new(self.api.clone(), self.session.clone(), id)
    }

    pub fn new_product_form(&self) -> ProductForm {
        ProductForm::create(self.api.clone(), self.session.clone())
    }

    pub fn edit_product_form(&self, listing: &Listing) -> Result<ProductForm, ClientError> {
        ProductForm::edit(self.api.clone(), self.session.clone(), listing)
    }

    pub fn profile(&self) -> ProfileView {
        ProfileView::new(self.api.clone())
    }

    pub fn chat(&self, counterpart: &str) -> ChatView {
        ChatView::new(self.channel.clone(), counterpart)
    }

    pub fn conversations(&self) -> ConversationsView {
        ConversationsView::new(self.channel.clone())
    }
}

//! `campus-swap` command line: drives the screens from a terminal.
//! Results go to `out`; inline notices go to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use campus_swap_client::config::{self, ConfigError};
use campus_swap_client::{Category, ClientError, Conversation, DeliveryState, Listing, ProfileUpdate};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::app::App;
use crate::router::{Navigation, Route};
use crate::views::{LoadState, LoginForm, RegisterForm};

#[derive(Debug, Parser)]
#[command(name = "campus-swap", version, about = "Campus marketplace client")]
pub struct Cli {
    /// Config file (default: ~/.campus-swap/config.yaml).
    #[arg(long, global = true, env = "CAMPUS_SWAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CAMPUS_SWAP_PASSWORD")]
        password: String,
    },
    /// Create an account and store the session.
    Register(RegisterArgs),
    Logout,
    /// Show the signed-in user.
    Whoami,
    #[command(subcommand)]
    Items(ItemsCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
    #[command(subcommand)]
    Chat(ChatCommand),
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "CAMPUS_SWAP_PASSWORD")]
    pub password: String,
    /// Defaults to `--password`.
    #[arg(long)]
    pub confirm_password: Option<String>,
    #[arg(long, default_value = "")]
    pub course: String,
    #[arg(long)]
    pub year: Option<String>,
    #[arg(long, default_value = "")]
    pub contact: String,
}

#[derive(Debug, Subcommand)]
pub enum ItemsCommand {
    /// Dashboard listing with optional filters.
    List {
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        search: Option<String>,
    },
    Show {
        id: String,
    },
    Create(DraftArgs),
    /// Update a listing you own; only the given fields change.
    Update {
        id: String,
        #[command(flatten)]
        changes: DraftChanges,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct DraftArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub price: Decimal,
    #[arg(long, default_value = "electronics")]
    pub category: Category,
    #[arg(long, default_value = "new")]
    pub condition: String,
    /// Image URL; repeat for more (first is the main image).
    #[arg(long = "image")]
    pub images: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DraftChanges {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub price: Option<Decimal>,
    #[arg(long)]
    pub category: Option<Category>,
    #[arg(long)]
    pub condition: Option<String>,
    /// Replaces the image list when given.
    #[arg(long = "image")]
    pub images: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    Show,
    /// Edit and save; email cannot be changed.
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        college: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ChatCommand {
    Send { user: String, text: String },
    History { user: String },
    Conversations,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Not logged in. Run `campus-swap login --email <EMAIL> --password <PASSWORD>` first")]
    NotLoggedIn,
    #[error("Cannot determine config path (set --config or CAMPUS_SWAP_CONFIG)")]
    NoConfigPath,
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("{0}")]
    Screen(String),
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

/// `--config`/`CAMPUS_SWAP_CONFIG` (clap folds both into `cli.config`), else
/// the default path.
pub fn resolve_config_path(cli: &Cli) -> Result<PathBuf, CliError> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => config::default_config_path().ok_or(CliError::NoConfigPath),
    }
}

pub async fn run(cli: Cli, out: &mut dyn Write) -> Result<(), CliError> {
    let config_path = resolve_config_path(&cli)?;
    let cfg = config::load_or_default(&config_path)?;
    let mut app = App::from_config(cfg)?;
    execute(&mut app, cli.command, out).await
}

/// Route a protected command through the guard.
fn require(app: &mut App, route: Route) -> Result<(), CliError> {
    match app.navigate(&route.path()) {
        Navigation::Redirect { to: Route::Login, .. } => Err(CliError::NotLoggedIn),
        _ => Ok(()),
    }
}

pub async fn execute(app: &mut App, command: Command, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => {
            let landing = app.login(&LoginForm::new(email, password)).await?;
            let name = app
                .current_user()
                .map(|u| u.display_name().to_string())
                .unwrap_or_default();
            writeln!(out, "Logged in as {}", name)?;
            tracing::debug!(route = %landing, "landing route");
        }
        Command::Register(args) => {
            let form = RegisterForm {
                confirm_password: args.confirm_password.unwrap_or_else(|| args.password.clone()),
                name: args.name,
                email: args.email,
                password: args.password,
                course: args.course,
                year: args.year,
                contact_info: args.contact,
            };
            app.register(&form).await?;
            let name = app
                .current_user()
                .map(|u| u.display_name().to_string())
                .unwrap_or_default();
            writeln!(out, "Registered as {}", name)?;
        }
        Command::Logout => {
            app.logout()?;
            writeln!(out, "Logged out")?;
        }
        Command::Whoami => {
            require(app, Route::Profile)?;
            match app.current_user() {
                Some(user) => writeln!(out, "{} ({})", user.display_name(), user.id)?,
                None => writeln!(out, "Logged in")?,
            }
        }
        Command::Items(cmd) => items(app, cmd, out).await?,
        Command::Profile(cmd) => profile(app, cmd, out).await?,
        Command::Chat(cmd) => chat(app, cmd, out).await?,
    }
    Ok(())
}

async fn items(app: &mut App, cmd: ItemsCommand, out: &mut dyn Write) -> Result<(), CliError> {
    match cmd {
        ItemsCommand::List { category, search } => {
            require(app, Route::Dashboard)?;
            let mut dashboard = app.dashboard();
            dashboard.mount().await;
            if let Some(notice) = dashboard.notice() {
                eprintln!("{}", notice);
            }
            dashboard.set_category(category);
            dashboard.set_search(search.as_deref().unwrap_or_default());
            let visible = dashboard.visible();
            if visible.is_empty() {
                writeln!(out, "No items found")?;
            }
            for listing in visible {
                writeln!(out, "{}", listing_row(listing))?;
            }
        }
        ItemsCommand::Show { id } => {
            require(app, Route::Product(id.clone()))?;
            let mut detail = app.product_detail(&id);
            detail.mount().await;
            match detail.state() {
                LoadState::Ready(listing) => {
                    write_listing(out, listing)?;
                    if detail.is_owner() {
                        writeln!(out, "You are the seller of this item")?;
                    }
                }
                LoadState::Error(message) => return Err(CliError::Screen(message.clone())),
                LoadState::Loading => return Err(CliError::Timeout("the listing")),
            }
        }
        ItemsCommand::Create(args) => {
            require(app, Route::NewProduct)?;
            let mut form = app.new_product_form();
            form.draft.title = args.title;
            form.draft.description = args.description;
            form.draft.price = args.price;
            form.draft.category = args.category;
            form.draft.condition = args.condition;
            form.draft.images = args.images;
            let route = form.submit().await?;
            writeln!(out, "Created {}", route)?;
        }
        ItemsCommand::Update { id, changes } => {
            require(app, Route::Product(id.clone()))?;
            let listing = app.api().get_item(&id).await?;
            let mut form = app.edit_product_form(&listing)?;
            let draft = &mut form.draft;
            if let Some(title) = changes.title {
                draft.title = title;
            }
            if let Some(description) = changes.description {
                draft.description = description;
            }
            if let Some(price) = changes.price {
                draft.price = price;
            }
            if let Some(category) = changes.category {
                draft.category = category;
            }
            if let Some(condition) = changes.condition {
                draft.condition = condition;
            }
            if !changes.images.is_empty() {
                draft.images = changes.images;
            }
            let route = form.submit().await?;
            writeln!(out, "Updated {}", route)?;
        }
        ItemsCommand::Delete { id } => {
            require(app, Route::Product(id.clone()))?;
            let mut detail = app.product_detail(&id);
            detail.mount().await;
            if let LoadState::Error(message) = detail.state() {
                return Err(CliError::Screen(message.clone()));
            }
            detail.delete().await?;
            writeln!(out, "Deleted {}", id)?;
        }
    }
    Ok(())
}

async fn profile(app: &mut App, cmd: ProfileCommand, out: &mut dyn Write) -> Result<(), CliError> {
    require(app, Route::Profile)?;
    let mut view = app.profile();
    view.mount().await;
    if let LoadState::Error(message) = view.state() {
        return Err(CliError::Screen(message.clone()));
    }
    if let ProfileCommand::Update {
        name,
        phone,
        college,
        bio,
    } = cmd
    {
        if let Some(draft) = view.edit() {
            apply_profile_changes(draft, name, phone, college, bio);
        }
        view.save().await?;
        if let Some(message) = view.message() {
            writeln!(out, "{}", message)?;
        }
    }
    if let Some(profile) = view.state().data() {
        writeln!(out, "Name:    {}", profile.name)?;
        writeln!(out, "Email:   {}", profile.email)?;
        writeln!(out, "Phone:   {}", profile.phone.as_deref().unwrap_or("-"))?;
        writeln!(out, "College: {}", profile.college.as_deref().unwrap_or("-"))?;
        writeln!(out, "Bio:     {}", profile.bio.as_deref().unwrap_or("-"))?;
    }
    Ok(())
}

fn apply_profile_changes(
    draft: &mut ProfileUpdate,
    name: Option<String>,
    phone: Option<String>,
    college: Option<String>,
    bio: Option<String>,
) {
    if let Some(name) = name {
        draft.name = name;
    }
    if phone.is_some() {
        draft.phone = phone;
    }
    if college.is_some() {
        draft.college = college;
    }
    if bio.is_some() {
        draft.bio = bio;
    }
}

async fn chat(app: &mut App, cmd: ChatCommand, out: &mut dyn Write) -> Result<(), CliError> {
    let result = chat_command(app, cmd, out).await;
    app.channel().disconnect();
    result
}

async fn chat_command(app: &mut App, cmd: ChatCommand, out: &mut dyn Write) -> Result<(), CliError> {
    let timeout = app.connect_timeout();
    match cmd {
        ChatCommand::Send { user, text } => {
            require(app, Route::Chat(user.clone()))?;
            let mut view = app.chat(&user);
            view.mount(timeout).await;
            if let LoadState::Error(message) = view.state() {
                return Err(CliError::Screen(message));
            }
            let Some(delivery) = view.send(&text) else {
                return Err(ClientError::validation("Message is empty").into());
            };
            match delivery.outcome().await {
                DeliveryState::Failed(reason) => {
                    return Err(ClientError::Socket(reason).into())
                }
                _ => writeln!(out, "Sent to {}", user)?,
            }
        }
        ChatCommand::History { user } => {
            require(app, Route::Chat(user.clone()))?;
            let mut view = app.chat(&user);
            view.mount(timeout).await;
            let state = wait_loaded(|| view.state(), timeout).await;
            match state {
                LoadState::Ready(conversation) => write_history(out, &conversation)?,
                LoadState::Error(message) => return Err(CliError::Screen(message)),
                LoadState::Loading => return Err(CliError::Timeout("conversation history")),
            }
        }
        ChatCommand::Conversations => {
            require(app, Route::Messages)?;
            let mut view = app.conversations();
            view.mount(timeout).await;
            let state = wait_loaded(|| view.state(), timeout).await;
            match state {
                LoadState::Ready(list) if list.is_empty() => writeln!(out, "No conversations yet")?,
                LoadState::Ready(list) => {
                    for conversation in &list {
                        writeln!(out, "{}", conversation_row(conversation))?;
                    }
                }
                LoadState::Error(message) => return Err(CliError::Screen(message)),
                LoadState::Loading => return Err(CliError::Timeout("the conversation list")),
            }
        }
    }
    Ok(())
}

/// Poll a screen until it leaves `Loading` or `timeout` elapses.
async fn wait_loaded<T>(mut state: impl FnMut() -> LoadState<T>, timeout: Duration) -> LoadState<T> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let current = state();
        if !current.is_loading() || tokio::time::Instant::now() >= deadline {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn listing_row(listing: &Listing) -> String {
    format!(
        "{}\t{}\t${}\t{}\t{}",
        listing.id,
        listing.title,
        listing.price,
        listing.category,
        listing.seller_name()
    )
}

fn write_listing(out: &mut dyn Write, listing: &Listing) -> std::io::Result<()> {
    writeln!(out, "{}", listing.title)?;
    writeln!(out, "Price:     ${}", listing.price)?;
    writeln!(out, "Category:  {}", listing.category)?;
    if let Some(condition) = &listing.condition {
        writeln!(out, "Condition: {}", condition)?;
    }
    writeln!(out, "Seller:    {}", listing.seller_name())?;
    if let Some(rating) = listing.stats.rating {
        writeln!(out, "Rating:    {} ({} reviews)", rating, listing.stats.reviews)?;
    }
    for image in &listing.images {
        writeln!(out, "Image:     {}", image)?;
    }
    writeln!(out)?;
    writeln!(out, "{}", listing.description)
}

fn write_history(out: &mut dyn Write, conversation: &Conversation) -> std::io::Result<()> {
    if let Some(name) = &conversation.name {
        let status = if conversation.is_online { "online" } else { "offline" };
        writeln!(out, "Chat with {} ({})", name, status)?;
    }
    if conversation.messages.is_empty() {
        return writeln!(out, "No messages yet");
    }
    for message in &conversation.messages {
        let who = if message.sender_id == conversation.counterpart_user_id {
            conversation.name.as_deref().unwrap_or(&message.sender_id)
        } else {
            "you"
        };
        writeln!(
            out,
            "[{}] {}: {}",
            message.timestamp.format("%Y-%m-%d %H:%M"),
            who,
            message.text
        )?;
    }
    Ok(())
}

fn conversation_row(conversation: &Conversation) -> String {
    let name = conversation
        .name
        .as_deref()
        .unwrap_or(&conversation.counterpart_user_id);
    let mut row = format!("{}\t{}", conversation.counterpart_user_id, name);
    if let Some(last) = &conversation.last_message {
        row.push('\t');
        row.push_str(last);
    }
    if conversation.unread_count > 0 {
        row.push_str(&format!("\t({} unread)", conversation.unread_count));
    }
    row
}

//! Route table and navigation guard.
//!
//! Every screen except login and register needs a session. The guard only
//! looks at whether a token is present; it never inspects the token.

use std::fmt;
use std::sync::Arc;

use campus_swap_client::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Dashboard,
    Login,
    Register,
    Products,
    NewProduct,
    Product(String),
    Chat(String),
    Messages,
    Profile,
}

impl Route {
    /// Parse a path such as `/product/42`. Query strings and trailing slashes
    /// are ignored; `None` for anything not in the table.
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let route = match segments.as_slice() {
            [] | ["dashboard"] => Route::Dashboard,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            ["products"] => Route::Products,
            ["products", "new"] => Route::NewProduct,
            ["product", id] | ["products", id] => Route::Product((*id).to_string()),
            ["chat", user] => Route::Chat((*user).to_string()),
            ["messages"] => Route::Messages,
            ["profile"] => Route::Profile,
            _ => return None,
        };
        Some(route)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Dashboard => "/".into(),
            Route::Login => "/login".into(),
            Route::Register => "/register".into(),
            Route::Products => "/products".into(),
            Route::NewProduct => "/products/new".into(),
            Route::Product(id) => format!("/product/{}", id),
            Route::Chat(user) => format!("/chat/{}", user),
            Route::Messages => "/messages".into(),
            Route::Profile => "/profile".into(),
        }
    }

    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login | Route::Register)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Result of one navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    /// `from` is set when the requested route was remembered for after login.
    Redirect { to: Route, from: Option<Route> },
}

impl Navigation {
    /// The route that ends up on screen.
    pub fn route(&self) -> &Route {
        match self {
            Navigation::Render(route) => route,
            Navigation::Redirect { to, .. } => to,
        }
    }
}

#[derive(Debug)]
pub struct Router {
    session: Arc<SessionStore>,
    return_to: Option<Route>,
}

impl Router {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            return_to: None,
        }
    }

    /// Decide whether `path` may render for the current session.
    pub fn navigate(&mut self, path: &str) -> Navigation {
        let authenticated = self.session.is_authenticated();
        let Some(route) = Route::parse(path) else {
            tracing::debug!(path, "unknown route");
            let to = if authenticated {
                Route::Dashboard
            } else {
                Route::Login
            };
            return Navigation::Redirect { to, from: None };
        };
        self.guard(route, authenticated)
    }

    fn guard(&mut self, route: Route, authenticated: bool) -> Navigation {
        if route.is_protected() && !authenticated {
            tracing::debug!(route = %route, "not signed in, redirecting to login");
            self.return_to = Some(route.clone());
            return Navigation::Redirect {
                to: Route::Login,
                from: Some(route),
            };
        }
        if !route.is_protected() && authenticated {
            return Navigation::Redirect {
                to: Route::Dashboard,
                from: None,
            };
        }
        Navigation::Render(route)
    }

    /// Route that was requested before the login redirect, if any.
    pub fn pending_return(&self) -> Option<&Route> {
        self.return_to.as_ref()
    }

    /// Landing route after a successful login: the remembered route, once,
    /// else the dashboard.
    pub fn take_return_route(&mut self) -> Route {
        self.return_to.take().unwrap_or(Route::Dashboard)
    }
}

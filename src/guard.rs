//! Route guards: which pages need a signed-in user and where to send
//! everyone else.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::session::{SessionState, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Signup,
    Home,
    Profile,
    Services,
    Posts,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Login,
        Route::Signup,
        Route::Home,
        Route::Profile,
        Route::Services,
        Route::Posts,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::Home => "/",
            Route::Profile => "/profile",
            Route::Services => "/services",
            Route::Posts => "/posts",
        }
    }

    /// Pages only a signed-in user may see.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Route::Home | Route::Profile | Route::Services | Route::Posts
        )
    }

    /// Pages a signed-in user has no business on.
    pub fn is_auth_route(&self) -> bool {
        matches!(self, Route::Login | Route::Signup)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.trim();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        Route::ALL
            .into_iter()
            .find(|route| route.path() == path)
            .ok_or_else(|| Error::general(format!("unknown route: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// The session is still loading; render nothing yet.
    Wait,
    Redirect(Route),
}

pub fn guard(route: Route, session: &SessionState) -> GuardDecision {
    if session.loading {
        return GuardDecision::Wait;
    }
    match (session.is_signed_in(), route) {
        (false, route) if route.requires_auth() => GuardDecision::Redirect(Route::Login),
        (true, route) if route.is_auth_route() => GuardDecision::Redirect(Route::Home),
        _ => GuardDecision::Allow,
    }
}

/// Guard bound to the live session.
pub struct RouteGuard {
    store: SessionStore,
}

impl RouteGuard {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn check(&self, route: Route) -> GuardDecision {
        guard(route, &self.store.snapshot())
    }

    /// Decision for `route` once the initial session is known.
    pub async fn resolve(&mut self, route: Route) -> GuardDecision {
        let state = self.store.wait_until_ready().await;
        guard(route, &state)
    }

    /// Wait until `route` stops being allowed, e.g. after a sign-out, and
    /// return where to go instead. `None` if the session stops updating first.
    pub async fn watch(&mut self, route: Route) -> Option<Route> {
        let state = self
            .store
            .wait_for(|state| matches!(guard(route, state), GuardDecision::Redirect(_)))
            .await?;
        match guard(route, &state) {
            GuardDecision::Redirect(target) => Some(target),
            _ => None,
        }
    }
}

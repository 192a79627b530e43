use crate::models::{GateSnapshot, Role};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const QUIZ_PATH: &str = "/quiz";

/// RouteDecision
///
/// What the router should do with a navigation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
#[ts(export)]
pub enum RouteDecision {
    ShowPublicPage { path: String },
    ShowLoginPage,
    ShowSignupPage,
    RedirectTo { path: String },
    ShowDashboardForRole { role: Role },
    ShowQuizPage,
    /// The answer depends on session or freshness data still loading.
    Pending,
}

impl RouteDecision {
    fn redirect(path: &str) -> Self {
        RouteDecision::RedirectTo {
            path: path.to_string(),
        }
    }
}

/// NavigateResponse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NavigateResponse {
    pub decision: RouteDecision,
    /// Whether the site navbar and footer wrap the page.
    pub show_chrome: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Login,
    Signup,
    Dashboard,
    Quiz,
    Public,
}

impl Page {
    fn from_path(path: &str) -> Self {
        match path {
            LOGIN_PATH => Page::Login,
            SIGNUP_PATH => Page::Signup,
            DASHBOARD_PATH => Page::Dashboard,
            QUIZ_PATH => Page::Quiz,
            _ => Page::Public,
        }
    }
}

/// normalize_path
///
/// Drops query string and fragment, and a trailing slash (except on `/`).
/// An empty path is `/`.
pub fn normalize_path(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// decide
///
/// Pure mapping from the requested path and a gate snapshot to a routing
/// outcome. Evaluated fresh on every navigation.
///
/// | path              | signed out    | clinician           | patient, stale | patient, fresh    |
/// |-------------------|---------------|---------------------|----------------|-------------------|
/// | /login, /signup   | show page     | -> /dashboard       | -> /dashboard  | -> /dashboard     |
/// | /dashboard        | -> /login     | clinician dashboard | -> /quiz       | patient dashboard |
/// | /quiz             | -> /login     | quiz                | quiz           | quiz              |
/// | anything else     | show page     | show page           | show page      | show page         |
///
/// A missing or unrecognised role routes as patient.
pub fn decide(path: &str, snapshot: &GateSnapshot) -> RouteDecision {
    let path = normalize_path(path);
    let page = Page::from_path(&path);

    if page == Page::Public {
        return RouteDecision::ShowPublicPage { path };
    }

    let Some(identity) = &snapshot.identity else {
        if snapshot.is_loading {
            return RouteDecision::Pending;
        }
        return match page {
            Page::Login => RouteDecision::ShowLoginPage,
            Page::Signup => RouteDecision::ShowSignupPage,
            _ => RouteDecision::redirect(LOGIN_PATH),
        };
    };

    match page {
        Page::Login | Page::Signup => RouteDecision::redirect(DASHBOARD_PATH),
        Page::Quiz => RouteDecision::ShowQuizPage,
        Page::Dashboard => match identity.role.for_routing() {
            Role::Clinician => RouteDecision::ShowDashboardForRole {
                role: Role::Clinician,
            },
            _ if snapshot.is_loading => RouteDecision::Pending,
            _ if snapshot.is_fresh => RouteDecision::ShowDashboardForRole {
                role: Role::Patient,
            },
            _ => RouteDecision::redirect(QUIZ_PATH),
        },
        Page::Public => RouteDecision::ShowPublicPage { path },
    }
}

/// The auth pages render bare, without the site navbar and footer.
pub fn shows_site_chrome(path: &str) -> bool {
    !matches!(normalize_path(path).as_str(), LOGIN_PATH | SIGNUP_PATH)
}

pub fn navigate(path: &str, snapshot: &GateSnapshot) -> NavigateResponse {
    NavigateResponse {
        decision: decide(path, snapshot),
        show_chrome: shows_site_chrome(path),
    }
}

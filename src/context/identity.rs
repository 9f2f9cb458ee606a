//! User identity
//!
//! The dispatcher only asks who the user is and whether they are an admin.
//! Applications plug in their own `Identity`; `CookieIdentity` reads the user
//! id from a signed login cookie.

use std::collections::HashSet;

use super::Context;
use crate::handler::{Arg, Kwargs};

pub trait Identity: Send + Sync {
    fn user_id(&self, ctx: &Context) -> Option<String>;

    fn is_admin(&self, ctx: &Context) -> bool;

    /// Where unauthenticated users are sent
    fn login_url(&self, ctx: &Context) -> String {
        let params: Kwargs = [("return_to", Arg::Text(ctx.url_with_qs()))]
            .into_iter()
            .collect();
        ctx.compute_url(&["login"], &params)
    }
}

/// Identity from a signed cookie holding the user id
#[derive(Debug, Clone)]
pub struct CookieIdentity {
    cookie: String,
    admins: HashSet<String>,
}

impl CookieIdentity {
    pub fn new(cookie: &str, admins: impl IntoIterator<Item = String>) -> Self {
        Self {
            cookie: cookie.to_string(),
            admins: admins.into_iter().collect(),
        }
    }
}

impl Identity for CookieIdentity {
    fn user_id(&self, ctx: &Context) -> Option<String> {
        ctx.get_secure_cookie(&self.cookie).filter(|id| !id.is_empty())
    }

    fn is_admin(&self, ctx: &Context) -> bool {
        ctx.user_id().is_some_and(|id| self.admins.contains(id))
    }
}

/// Identity for apps without users: everyone is anonymous
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Identity for Anonymous {
    fn user_id(&self, _ctx: &Context) -> Option<String> {
        None
    }

    fn is_admin(&self, _ctx: &Context) -> bool {
        false
    }
}

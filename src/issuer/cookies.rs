use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Create the refresh token cookie.
pub(super) fn refresh_cookie(
    name: &str,
    refresh_token: &str,
    ttl_days: i64,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), refresh_token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/".to_string())
        .max_age(Duration::days(ttl_days))
        .build()
}

/// Create removal cookie for the refresh token.
pub(super) fn clear_refresh_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Get the refresh token from cookies.
pub(super) fn get_refresh_token(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_cookie_attributes() {
        let cookie = refresh_cookie("refreshToken", "abc", 30, true);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::days(30)));
    }

    #[test]
    fn insecure_cookie_for_local_http() {
        let cookie = refresh_cookie("refreshToken", "abc", 30, false);
        assert_eq!(cookie.secure(), Some(false));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie("refreshToken");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        let jar = CookieJar::new().add(Cookie::new("refreshToken", ""));
        assert_eq!(get_refresh_token(&jar, "refreshToken"), None);
        let jar = CookieJar::new().add(Cookie::new("refreshToken", "abc"));
        assert_eq!(get_refresh_token(&jar, "refreshToken").as_deref(), Some("abc"));
    }
}

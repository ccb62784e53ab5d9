use crate::error::ScrapeError;
use crate::scraper::page::{ElementHandle, Locator, Page};
use std::time::Duration;

pub struct LinkedInAuth;

impl LinkedInAuth {
    pub fn login_url(base_url: &str) -> String {
        format!("{}/login", base_url.trim_end_matches('/'))
    }

    pub fn username_field() -> Locator {
        Locator::id("username")
    }

    pub fn password_field() -> Locator {
        Locator::id("password")
    }

    pub fn submit_button() -> Locator {
        Locator::xpath("//button[@type='submit']")
    }

    /// Present on every page once the session is authenticated.
    pub fn landing_marker() -> Locator {
        Locator::id("global-nav")
    }

    /// Submits the login form and waits for the landing marker.
    /// A missing marker after `timeout` is a hard failure.
    pub async fn login<P: Page>(
        page: &P,
        base_url: &str,
        email: &str,
        password: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), ScrapeError> {
        page.navigate(&Self::login_url(base_url)).await?;

        let username_field = page.wait_for(&Self::username_field(), timeout, interval).await?;
        username_field.send_keys(email).await?;

        let password_field = page
            .find(&Self::password_field())
            .await?
            .ok_or_else(|| ScrapeError::ElementNotFound(Self::password_field().to_string()))?;
        password_field.send_keys(password).await?;

        let submit = page
            .find(&Self::submit_button())
            .await?
            .ok_or_else(|| ScrapeError::ElementNotFound(Self::submit_button().to_string()))?;
        submit.click().await?;

        page.wait_for(&Self::landing_marker(), timeout, interval).await?;
        tracing::debug!("Landing marker present after login");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::{DomChange, FakeElement, FakePage};

    const QUICK: Duration = Duration::from_millis(1);

    fn login_page(reaches_landing: bool) -> (FakePage, FakeElement, FakeElement) {
        let page = FakePage::new();
        let username = FakeElement::with_id("username");
        let password = FakeElement::with_id("password");
        page.insert(&LinkedInAuth::username_field(), username.clone());
        page.insert(&LinkedInAuth::password_field(), password.clone());

        let mut submit = FakeElement::builder("submit");
        if reaches_landing {
            submit = submit.on_click(
                &page.dom,
                DomChange::Insert(LinkedInAuth::landing_marker(), FakeElement::with_id("global-nav")),
            );
        }
        page.insert(&LinkedInAuth::submit_button(), submit.build());

        (page, username, password)
    }

    #[tokio::test]
    async fn fills_the_form_and_waits_for_landing() {
        let (page, username, password) = login_page(true);

        LinkedInAuth::login(&page, "https://www.linkedin.com/", "jane@example.com", "hunter2", QUICK, QUICK)
            .await
            .unwrap();

        assert_eq!(username.typed(), "jane@example.com");
        assert_eq!(password.typed(), "hunter2");
        assert_eq!(
            *page.visited.lock().unwrap(),
            vec!["https://www.linkedin.com/login".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_landing_marker_times_out() {
        let (page, _, _) = login_page(false);

        let err = LinkedInAuth::login(&page, "https://www.linkedin.com", "a", "b", QUICK, QUICK)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("global-nav"));
    }

    #[tokio::test]
    async fn missing_form_times_out() {
        let page = FakePage::new();

        let err = LinkedInAuth::login(&page, "https://www.linkedin.com", "a", "b", QUICK, QUICK)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }
}

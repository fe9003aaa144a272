use std::time::Duration;

use gleaner_core::error::HarvestError;
use gleaner_core::session::{Authenticator, SessionDriver};

/// Selectors and labels for a two-step username/password login flow.
#[derive(Debug, Clone)]
pub struct LoginSelectors {
    /// Page carrying the login form.
    pub login_url: String,
    pub username_field: String,
    pub password_field: String,
    /// Selector scanned for the step buttons, matched by label text.
    pub button: String,
    pub next_label: String,
    pub submit_label: String,
    /// Element that only renders once the session is authenticated.
    pub logged_in_marker: String,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            login_url: "https://x.com/i/flow/login".into(),
            username_field: r#"[autocomplete="username"]"#.into(),
            password_field: r#"[name="password"][type="password"]"#.into(),
            button: "button".into(),
            next_label: "Next".into(),
            submit_label: "Log in".into(),
            logged_in_marker: r#"[data-testid="AppTabBar_Home_Link"]"#.into(),
        }
    }
}

/// Credential-based login through any session driver.
///
/// One [`Authenticator::attempt`] call is one full pass: fresh navigation
/// to the login page, username step, password step, then a bounded wait
/// for the logged-in marker. A step that never renders fails the attempt
/// (`Ok(false)`) rather than the run; the caller decides how many
/// attempts to spend.
pub struct FormAuthenticator {
    username: String,
    password: String,
    selectors: LoginSelectors,
    /// Wait for each form step to render.
    step_timeout: Duration,
    /// Wait for the logged-in marker after submitting.
    confirm_timeout: Duration,
}

impl FormAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            selectors: LoginSelectors::default(),
            step_timeout: Duration::from_secs(10),
            confirm_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_selectors(mut self, selectors: LoginSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_timeouts(mut self, step_timeout: Duration, confirm_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self.confirm_timeout = confirm_timeout;
        self
    }

    async fn run_steps<D: SessionDriver>(&self, driver: &D) -> Result<(), HarvestError> {
        let sel = &self.selectors;

        driver.navigate(&sel.login_url).await?;

        let username = driver
            .wait_for_one(&sel.username_field, self.step_timeout)
            .await?;
        driver.type_text(&username, &self.username).await?;
        let next = driver
            .find_by_text(&sel.button, &sel.next_label, self.step_timeout)
            .await?;
        driver.click(&next).await?;

        let password = driver
            .wait_for_one(&sel.password_field, self.step_timeout)
            .await?;
        driver.type_text(&password, &self.password).await?;
        let submit = driver
            .find_by_text(&sel.button, &sel.submit_label, self.step_timeout)
            .await?;
        driver.click(&submit).await?;

        driver
            .wait_for_one(&sel.logged_in_marker, self.confirm_timeout)
            .await?;
        Ok(())
    }
}

impl<D: SessionDriver> Authenticator<D> for FormAuthenticator {
    async fn attempt(&self, driver: &D) -> Result<bool, HarvestError> {
        match self.run_steps(driver).await {
            Ok(()) => Ok(true),
            // A step that never rendered is this attempt failing, not
            // the run: challenge screens and slow loads look the same.
            Err(err) if err.is_wait_timeout() => {
                tracing::warn!(error = %err, "Login step did not render");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_core::session::Selectors;
    use gleaner_core::testutil::ScriptedDriver;

    fn quick() -> FormAuthenticator {
        FormAuthenticator::new("user", "hunter2")
            .with_timeouts(Duration::from_millis(50), Duration::from_millis(50))
    }

    fn staged_driver(auth: &FormAuthenticator, with_marker: bool) -> ScriptedDriver {
        let driver = ScriptedDriver::new(Selectors::default());
        driver.stage_field(&auth.selectors.username_field);
        driver.stage_field(&auth.selectors.password_field);
        driver.stage_button(&auth.selectors.next_label);
        driver.stage_button(&auth.selectors.submit_label);
        if with_marker {
            driver.stage_field(&auth.selectors.logged_in_marker);
        }
        driver
    }

    #[tokio::test]
    async fn test_successful_login_types_and_clicks_in_order() {
        let auth = quick();
        let driver = staged_driver(&auth, true);

        assert!(auth.attempt(&driver).await.unwrap());

        let typed = driver.typed_values();
        assert_eq!(typed[0].1, "user");
        assert_eq!(typed[1].1, "hunter2");
        assert_eq!(driver.clicked_buttons(), vec!["Next", "Log in"]);
        assert_eq!(driver.navigations(), vec![auth.selectors.login_url.clone()]);
    }

    #[tokio::test]
    async fn test_missing_marker_fails_attempt_not_run() {
        let auth = quick();
        let driver = staged_driver(&auth, false);

        assert!(!auth.attempt(&driver).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_username_field_fails_attempt() {
        let auth = quick();
        let driver = ScriptedDriver::new(Selectors::default());

        assert!(!auth.attempt(&driver).await.unwrap());
    }
}

use rand::seq::SliceRandom;
use threadscope_core::{BrowserConfig, ViewportSize};

/// Chrome flags that hide the usual automation markers.
pub const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-dev-shm-usage",
    "--disable-background-networking",
    "--disable-sync",
    "--no-first-run",
    "--no-default-browser-check",
    "--mute-audio",
];

/// Fingerprint presented by one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub user_agent: String,
    pub viewport: ViewportSize,
    pub locale: String,
    pub timezone: String,
}

impl SessionProfile {
    /// Pick a user agent, viewport and locale at random from the configured pools.
    pub fn randomized(config: &BrowserConfig) -> Self {
        let mut rng = rand::thread_rng();

        let user_agent = config
            .user_agents
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| BrowserConfig::default().user_agents[0].clone());
        let viewport = config
            .viewports
            .choose(&mut rng)
            .copied()
            .unwrap_or(ViewportSize {
                width: 1280,
                height: 800,
            });

        let locale = config
            .locales
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| "en-US".to_string());

        Self {
            user_agent,
            viewport,
            locale,
            timezone: config.timezone.clone(),
        }
    }

    /// `navigator.languages` value: the locale, then its bare language.
    pub fn languages(&self) -> Vec<String> {
        let mut langs = vec![self.locale.clone()];
        if let Some((lang, _)) = self.locale.split_once('-') {
            langs.push(lang.to_string());
        }
        langs
    }

    /// `Accept-Language` header matching [`Self::languages`].
    pub fn accept_language(&self) -> String {
        self.languages()
            .iter()
            .enumerate()
            .map(|(i, lang)| {
                if i == 0 {
                    lang.clone()
                } else {
                    format!("{lang};q=0.9")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Script injected before any page script runs.
    pub fn stealth_script(&self) -> String {
        let languages = serde_json::to_string(&self.languages()).unwrap_or_else(|_| "[]".into());
        format!(
            r#"(() => {{
    Object.defineProperty(navigator, 'webdriver', {{ get: () => false }});

    const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
    if (originalQuery) {{
        window.navigator.permissions.query = (parameters) =>
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({{ state: Notification.permission, name: 'notifications', onchange: null }})
                : originalQuery.call(window.navigator.permissions, parameters);
    }}

    if (!window.chrome) {{
        window.chrome = {{ runtime: {{}} }};
    }}

    Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3, 4, 5] }});
    Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});
}})();"#
        )
    }
}

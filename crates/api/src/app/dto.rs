use serde::{Deserialize, Serialize};

use warmsend_infra::flows::RecipientImport;

/// Body of `PUT /recipients`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub warmup: bool,
    pub emails: Vec<String>,
}

impl ImportRequest {
    /// Non-blank addresses as import items, in request order.
    pub fn into_imports(self) -> Vec<RecipientImport> {
        let warmup = self.warmup;
        self.emails
            .into_iter()
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty())
            .map(|email| RecipientImport { email, warmup })
            .collect()
    }
}

/// Body of `PUT /recipients/warmup`.
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupRequest {
    pub warmup: bool,
    pub emails: Vec<String>,
}

impl WarmupRequest {
    pub fn addresses(&self) -> Vec<&str> {
        self.emails
            .iter()
            .map(|email| email.trim())
            .filter(|email| !email.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WarmupUpdated {
    pub updated: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImportAccepted {
    pub queued: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
}

pub fn unsubscribe_page() -> String {
    r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Unsubscribe</title></head>
<body>
<h1>Unsubscribe</h1>
<p>Press the button to stop receiving these emails.</p>
<button id="confirm">Unsubscribe</button>
<p id="result"></p>
<script>
document.getElementById("confirm").addEventListener("click", async () => {
  const res = await fetch(window.location.href, { method: "PUT" });
  document.getElementById("result").textContent =
    res.ok ? "You have been unsubscribed." : "Something went wrong, please try again.";
});
</script>
</body>
</html>
"#
    .to_string()
}

use crate::browser::{LoadedPage, PageLoader};
use crate::error::{AcquisitionError, NavigationError};
use crate::sections::{self, Sections};

/// Prefix `http://` when the caller gave a bare host. Anything already
/// carrying a scheme is left untouched; malformed hosts are the acquisition
/// step's problem.
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// The ordered candidate list: the address as given, widened to secure
/// transport as a second try when the original is plain `http`.
pub fn build_candidates(address: &str) -> Vec<String> {
    let mut candidates = vec![address.to_string()];
    if let Some(rest) = address.strip_prefix("http://") {
        candidates.push(format!("https://{}", rest));
    }
    candidates
}

/// Try each candidate strictly in order, one isolated session per attempt.
/// First success wins; exhaustion reports the last candidate's failure.
pub async fn acquire(
    loader: &dyn PageLoader,
    candidates: &[String],
) -> Result<LoadedPage, AcquisitionError> {
    let mut last_error: Option<NavigationError> = None;

    for (attempt, candidate) in candidates.iter().enumerate() {
        println!("🌐 Attempt {}/{}: {}", attempt + 1, candidates.len(), candidate);
        match loader.load(candidate).await {
            Ok(page) => {
                println!("✅ Loaded {} ({} bytes of HTML)", candidate, page.html.len());
                return Ok(page);
            }
            Err(e) => {
                eprintln!("❌ Page load error: {}", e);
                last_error = Some(e);
            }
        }
    }

    Err(AcquisitionError {
        attempts: candidates.len(),
        last: last_error
            .unwrap_or_else(|| NavigationError::new("", "no candidate addresses to try")),
    })
}

/// The whole pipeline for one request: normalize, acquire, extract. Strictly
/// sequential; either acquisition fully succeeds and extraction runs, or the
/// request fails as a unit.
pub async fn scrape_site(
    loader: &dyn PageLoader,
    raw_url: &str,
) -> Result<Sections, AcquisitionError> {
    println!("🔍 Scraping: {}", raw_url);

    let address = normalize_address(raw_url);
    let candidates = build_candidates(&address);
    let page = acquire(loader, &candidates).await?;

    Ok(sections::extract_sections(&page.html, page.session.as_ref(), &page.url).await)
}

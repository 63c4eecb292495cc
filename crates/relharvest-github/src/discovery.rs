//! Population discovery: the top repositories by stars, materialised once per run

use relharvest_core::RequestError;
use rustc_hash::FxHashSet;

use crate::api::{GithubApi, SearchRepo};
use crate::state::Repository;

/// Result of one discovery pass
#[derive(Debug, Default)]
pub struct Discovery {
    /// Ranked, duplicate-free, at most `target` long
    pub repositories: Vec<Repository>,
    pub pages: u32,
    pub duplicates: usize,
    pub malformed: usize,
    /// Set when a later page failed and the population was cut short
    pub partial: bool,
}

/// Walk search pages until `target` unique repositories are collected.
///
/// Ranking shifts between pages, so the same repository can appear twice; the
/// first occurrence wins. A failure on the first page (or any fatal error) is
/// returned; a failure after that keeps what was collected.
pub fn discover(api: &GithubApi, query: &str, target: usize) -> Result<Discovery, RequestError> {
    let mut out = Discovery::default();
    let mut seen = FxHashSet::default();
    let mut pages = api.search(query);

    while out.repositories.len() < target {
        let page = match pages.next() {
            None => break,
            Some(Ok(page)) => page,
            Some(Err(e)) if e.is_fatal() || out.pages == 0 => return Err(e),
            Some(Err(e)) => {
                log::warn!(
                    "Discovery stopped after {} pages ({} repositories): {e}",
                    out.pages,
                    out.repositories.len()
                );
                out.partial = true;
                break;
            }
        };
        out.pages += 1;

        for item in page.items {
            let repo = match serde_json::from_value::<SearchRepo>(item) {
                Ok(r) => r.into_repository(),
                Err(e) => {
                    log::debug!("Skipping malformed search item: {e}");
                    out.malformed += 1;
                    continue;
                }
            };
            if !seen.insert(repo.key.clone()) {
                out.duplicates += 1;
                continue;
            }
            out.repositories.push(repo);
            if out.repositories.len() >= target {
                break;
            }
        }
    }
    out.malformed += pages.malformed_pages();

    log::info!(
        "Discovered {} repositories in {} pages ({} duplicates, {} malformed)",
        out.repositories.len(),
        out.pages,
        out.duplicates,
        out.malformed
    );
    Ok(out)
}

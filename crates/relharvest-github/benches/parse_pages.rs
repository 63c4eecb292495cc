use chrono::Utc;
use relharvest_github::api::{ReleaseItem, SearchRepo, TagItem};
use relharvest_github::schema::{releases_batch, repositories_batch};
use relharvest_github::RepoKey;

fn main() {
    divan::main();
}

/// Synthetic page of `n` releases shaped like the live API
fn releases_page(n: usize) -> String {
    let items: Vec<_> = (0..n)
        .map(|i| {
            serde_json::json!({
                "id": 100_000 + i,
                "tag_name": format!("v1.{i}.0"),
                "name": format!("Release 1.{i}.0"),
                "published_at": "2023-05-01T12:00:00Z",
                "draft": false,
                "prerelease": i % 10 == 0,
                "body": "Bug fixes and performance improvements. ".repeat(20),
                "author": {"login": "octocat", "id": 1},
                "assets": []
            })
        })
        .collect();
    serde_json::to_string(&items).unwrap()
}

fn tags_page(n: usize) -> String {
    let items: Vec<_> = (0..n)
        .map(|i| {
            serde_json::json!({
                "name": format!("v0.{i}"),
                "commit": {"sha": format!("{i:040x}"), "url": "https://api.github.com/x"},
                "zipball_url": "https://api.github.com/z",
                "tarball_url": "https://api.github.com/t"
            })
        })
        .collect();
    serde_json::to_string(&items).unwrap()
}

fn search_page(n: usize) -> String {
    let items: Vec<_> = (0..n)
        .map(|i| {
            serde_json::json!({
                "id": i,
                "name": format!("repo{i}"),
                "full_name": format!("owner{i}/repo{i}"),
                "owner": {"login": format!("owner{i}")},
                "stargazers_count": 100_000 - i,
                "created_at": "2012-01-01T00:00:00Z",
                "language": "Rust",
                "topics": ["cli", "parser", "async"]
            })
        })
        .collect();
    serde_json::json!({"total_count": n, "items": items}).to_string()
}

#[divan::bench]
fn parse_releases(bencher: divan::Bencher) {
    let body = releases_page(100);
    let repo = RepoKey::new("acme", "widget");
    bencher.bench(|| {
        let items: Vec<ReleaseItem> = serde_json::from_str(&body).unwrap();
        items
            .into_iter()
            .filter_map(|r| r.into_record(&repo, Utc::now()))
            .count()
    });
}

#[divan::bench]
fn parse_tags(bencher: divan::Bencher) {
    let body = tags_page(100);
    bencher.bench(|| serde_json::from_str::<Vec<TagItem>>(&body).unwrap().len());
}

#[divan::bench]
fn parse_search(bencher: divan::Bencher) {
    let body = search_page(100);
    bencher.bench(|| {
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let items: Vec<SearchRepo> = serde_json::from_value(value["items"].clone()).unwrap();
        items.len()
    });
}

#[divan::bench]
fn build_release_batch(bencher: divan::Bencher) {
    let repo = RepoKey::new("acme", "widget");
    let records: Vec<_> = serde_json::from_str::<Vec<ReleaseItem>>(&releases_page(100))
        .unwrap()
        .into_iter()
        .filter_map(|r| r.into_record(&repo, Utc::now()))
        .collect();
    bencher.bench(|| releases_batch(&records).unwrap().num_rows());
}

#[divan::bench]
fn build_repositories_batch(bencher: divan::Bencher) {
    let value: serde_json::Value = serde_json::from_str(&search_page(100)).unwrap();
    let repos: Vec<_> = serde_json::from_value::<Vec<SearchRepo>>(value["items"].clone())
        .unwrap()
        .into_iter()
        .map(SearchRepo::into_repository)
        .collect();
    bencher.bench(|| repositories_batch(&repos, Utc::now()).unwrap().num_rows());
}

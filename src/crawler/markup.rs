//! Platform URLs, page texts and element locators
//!
//! Everything that depends on the platform's concrete markup lives here so
//! a layout change touches one file.

use crate::browser::{ancestor_locator, Locator};
use crate::storage::Owner;
use chrono::NaiveDate;

/// Banner shown when the platform throttles the client
pub const RATE_LIMITED_BANNER: &str =
    "Sorry, you are rate limited. Please wait a few moments then try again.";

/// Banner shown when the platform failed to render a page
pub const UPSTREAM_ERROR_BANNER: &str = "Something went wrong. Try reloading.";

/// Banners shown for accounts or pages that do not exist
pub const MISSING_PAGE_BANNERS: [&str; 2] = [
    "This account doesn\u{2019}t exist",
    "Hmm...this page doesn\u{2019}t exist. Try searching for something else.",
];

/// Text a reply's body starts with
pub const REPLY_PREFIX: &str = "Replying to @";

/// Parents between an item's permalink and its content container
pub const CONTAINER_DEPTH: usize = 10;

/// Scrolls the results page to the bottom to reveal more items
pub const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// Profile page of an owner
pub fn profile_url(base_url: &str, owner: &Owner) -> String {
    format!("{}/{}", trim_base(base_url), owner)
}

/// Single-item page
pub fn status_url(base_url: &str, owner: &Owner, id: &str) -> String {
    format!("{}/{}/status/{}", trim_base(base_url), owner, id)
}

/// Search query covering `[day, day + 1)` for an owner, retweets excluded
pub fn search_query(owner: &Owner, day: NaiveDate) -> String {
    let until = day.succ_opt().unwrap_or(day);
    format!(
        "from:{} exclude:retweets since:{} until:{}",
        owner,
        day.format("%Y-%m-%d"),
        until.format("%Y-%m-%d")
    )
}

/// Latest-first search results page for a query
pub fn search_url(base_url: &str, query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!(
        "{}/search?q={}&src=typed_query&f=live",
        trim_base(base_url),
        encoded
    )
}

/// One result item on a search page
pub fn search_item() -> Locator {
    Locator::css("article")
}

/// Timestamp element inside a result item; its parent is the permalink
pub fn item_time() -> Locator {
    Locator::css("time")
}

/// Parent of an element
pub fn parent() -> Locator {
    ancestor_locator(1)
}

/// "No results" notice for exactly this query
pub fn no_results(query: &str) -> Locator {
    Locator::xpath(format!("//span[text()='No results for \"{}\"']", query))
}

/// "Joined <Month> <Year>" caption on a profile page
pub fn joined_caption() -> Locator {
    Locator::xpath("//span[contains(text(), 'Joined')]")
}

/// Permalink to an item, matched case-insensitively on its href
pub fn permalink(owner: &Owner, id: &str) -> Locator {
    Locator::xpath(format!(
        "//a[translate(@href, 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz')='/{}/status/{}']",
        owner,
        id.to_ascii_lowercase()
    ))
}

/// Body text of an item, relative to its container
pub fn item_text() -> Locator {
    Locator::css("article div > div > div:nth-child(3) div[id^='id_']")
}

/// Body text of a reply, below the "Replying to" line
pub fn reply_text() -> Locator {
    Locator::css("article div > div > div:nth-child(3) > div:nth-child(2) div[id^='id_']")
}

/// Human-readable date label inside a permalink
pub fn date_label() -> Locator {
    Locator::css("span")
}

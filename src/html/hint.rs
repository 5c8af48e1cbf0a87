use std::fmt;

/// Coarse guess at what a page is about, fed to extraction as context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTypeHint {
    ProductListing,
    ServicePage,
    LocationPage,
    NavigationPage,
    Unknown,
}

const PRODUCT_MARKERS: &[&str] = &["product-tile", "product-grid", "add-to-cart", "price", "buy-now"];
const SERVICE_MARKERS: &[&str] = &["insurance", "photo", "travel", "optical", "pharmacy", "gas"];
const LOCATION_MARKERS: &[&str] = &["warehouse", "store-hours", "address", "phone", "directions"];
const NAVIGATION_MARKERS: &[&str] = &["sitemap", "category", "department", "browse", "menu"];

impl PageTypeHint {
    /// Checks markers in priority order: product, service, location, navigation
    pub fn detect(html: &str) -> Self {
        let lower = html.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if has(PRODUCT_MARKERS) {
            Self::ProductListing
        } else if has(SERVICE_MARKERS) {
            Self::ServicePage
        } else if has(LOCATION_MARKERS) {
            Self::LocationPage
        } else if has(NAVIGATION_MARKERS) {
            Self::NavigationPage
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductListing => "product_listing",
            Self::ServicePage => "service_page",
            Self::LocationPage => "location_page",
            Self::NavigationPage => "navigation_page",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PageTypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

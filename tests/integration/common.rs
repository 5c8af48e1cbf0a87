use catalog_harvest::config::{parse_config, Config};
use catalog_harvest::storage::CategoryRecord;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Generator section pointing at a mock backend
pub struct GeneratorSetup<'a> {
    pub endpoint: &'a str,
    pub api_key_env: &'a str,
}

/// Builds a validated configuration for a mock site
pub fn site_config(base_url: &str, db_path: &Path, generator: Option<GeneratorSetup>) -> Config {
    let mut content = format!(
        r#"
[site]
base-url = "{base_url}"

[scraper]
request-delay-ms = 0
wait-for-dynamic = false
fetch-timeout-secs = 5

[user-agent]
crawler-name = "HarvestTest"
crawler-version = "1.0.0"
contact-url = "https://example.com/about"
contact-email = "test@example.com"

[output]
database-path = "{db}"
export-dir = "{exports}"
"#,
        db = db_path.display(),
        exports = db_path.with_file_name("exports").display(),
    );

    if let Some(generator) = generator {
        content.push_str(&format!(
            r#"
[generator]
endpoint = "{}"
model = "test-model"
api-key-env = "{}"
request-timeout-secs = 5
"#,
            generator.endpoint, generator.api_key_env
        ));
    }

    parse_config(&content).expect("test config should be valid")
}

pub async fn mount_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

/// Electronics with two children: Televisions and Audio
pub fn sitemap_page() -> String {
    r#"<html><body><div class="category-list"><ul>
        <li><a href="/electronics.html">Electronics</a>
          <ul>
            <li><a href="/tvs.html">Televisions</a></li>
            <li><a href="/audio.html">Audio</a></li>
          </ul>
        </li>
        <li><a href="/kitchen.html">Kitchen</a></li>
    </ul></div></body></html>"#
        .to_string()
}

/// A product grid; wrapped in a results container when `container` is set
pub fn listing_page(tiles: usize, container: bool) -> String {
    let tiles: String = (1..=tiles)
        .map(|i| {
            format!(
                r#"<div data-testid="ProductTile_{i}"><h3>Catalog item {i}</h3>
                <span class="price">${i}9.99</span><a href="/item.product.{i}.html">view</a></div>"#
            )
        })
        .collect();
    if container {
        format!("<html><body><div id=\"product-results\">{tiles}</div></body></html>")
    } else {
        format!("<html><body><section>{tiles}</section></body></html>")
    }
}

/// Three subcategory links and nothing else
pub fn navigation_page() -> String {
    r#"<html><body><nav>
        <a href="/tvs.html">Televisions</a>
        <a href="/audio.html">Audio</a>
        <a href="/cameras.html">Cameras</a>
    </nav></body></html>"#
        .to_string()
}

/// Mounts the sitemap, electronics, televisions and kitchen pages; audio stays unmounted
pub async fn mount_site(server: &MockServer, kitchen_tiles: usize) {
    mount_page(server, "/SiteMapDisplayView", sitemap_page()).await;
    mount_page(server, "/electronics.html", navigation_page()).await;
    mount_page(server, "/tvs.html", listing_page(25, true)).await;
    mount_page(server, "/kitchen.html", listing_page(kitchen_tiles, false)).await;
}

pub fn category<'a>(categories: &'a [CategoryRecord], name: &str) -> &'a CategoryRecord {
    categories
        .iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("category {} not stored", name))
}

/// Number of GET requests the server saw for `route`
pub async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}

//! Fixture pages and archive helpers

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// A page with one of everything the agent looks for.
pub const SHOP_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Corner Shop</title>
  <style>body{margin:0}</style>
  <link rel="stylesheet" href="/css/site.css">
  <link rel="stylesheet" href="/css/missing.css">
  <script>window.shop = {};</script>
  <script src="/js/cart.js"></script>
  <script src="https://cdn.example.net/lib/analytics.js"></script>
  <script src="chrome-extension://abcdef/inject.js"></script>
</head>
<body>
  <h1>Corner Shop</h1>
  <img src="/img/logo.png">
</body>
</html>"#;

pub const SITE_CSS: &str = "h1{color:teal}";
pub const CART_JS: &str = "function addToCart(id){}";

/// Unpack a zip into path -> content.
pub fn unzip(bytes: &[u8]) -> BTreeMap<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).expect("zip entry");
        let mut content = String::new();
        entry.read_to_string(&mut content).expect("utf-8 entry");
        entries.insert(entry.name().to_string(), content);
    }
    entries
}

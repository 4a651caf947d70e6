//! Browser test client for issuing queries and subscriptions by hand

const TEMPLATE: &str = include_str!("../static/sse-client.html");

/// Render the test client page, pointing it at the GraphQL endpoint `sse_url`
pub fn render_test_client(title: &str, sse_url: &str) -> String {
    TEMPLATE
        .replace("${title}", &escape_html(title))
        .replace("${sse_url}", &escape_js_string(sse_url))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_js_string(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('<', "\\u003c")
}

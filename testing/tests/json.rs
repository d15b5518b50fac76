#![cfg(feature = "serde-json")]

use safehtml::{assigns, Environment, Value};
use serde_json::json;

#[test]
fn test_json_assigns() {
    let data = json!({
        "title": "<News>",
        "posts": [
            { "id": 1, "tags": ["a", "b"] },
            { "id": 2, "tags": [] },
        ],
        "draft": null,
    });
    let t = Environment::new()
        .compile(
            "<h1><%= @data.title %></h1>\
             <%= for post <- @data.posts do %>\
             <p id=\"post-<%= post.id %>\"><%= for tag <- post.tags do %>#<%= tag %><% end %></p>\
             <% end %><%= @data.draft %>",
        )
        .unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { data => Value::from(data) })
            .unwrap(),
        "<h1>&lt;News&gt;</h1><p id=\"post-1\">#a#b</p><p id=\"post-2\"></p>"
    );
}

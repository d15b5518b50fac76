use safehtml::{assigns, Assigns, Environment, Error, StaticToken};
use safehtml_testing::template_path;

#[test]
fn test_form_template() {
    let t = Environment::new()
        .compile_file(template_path("form.html.eex"))
        .unwrap();
    let assigns = assigns! { action => "/posts/1", title => "<x>" };
    let out = t
        .render_with(&assigns, &StaticToken::new("T"))
        .unwrap()
        .into_string();
    assert_eq!(
        out,
        "<form action=\"/posts/1\" method=\"post\">\
         <input name=\"_method\" type=\"hidden\" value=\"put\">\
         <input name=\"_csrf_token\" type=\"hidden\" value=\"T\">\n  \
         <input name=\"title\" value=\"&lt;x&gt;\">\n  \
         <button data-csrf=\"T\" data-method=\"post\" data-to=\"/posts/1\">Save</button>\n\
         </form>\n\
         <a data-csrf=\"T\" data-method=\"delete\" data-to=\"/posts/1\" href=\"/posts/1\" \
         rel=\"nofollow\" data-confirm=\"Really?\">Delete</a>\n"
    );
}

#[test]
fn test_csrf_needs_a_source() {
    let t = Environment::new()
        .compile("<%= button(\"Go\", to: \"/run\") %>")
        .unwrap();
    assert!(matches!(t.render(&Assigns::new()), Err(Error::CsrfUnavailable)));

    let token = |action: Option<&str>| -> safehtml::Result<String> {
        Ok(format!("for:{}", action.unwrap_or("*")))
    };
    assert_eq!(
        t.render_with(&Assigns::new(), &token).unwrap().into_string(),
        "<button data-csrf=\"for:/run\" data-method=\"post\" data-to=\"/run\">Go</button>"
    );
}

#[test]
fn test_get_links_need_no_token() {
    let t = Environment::new()
        .compile("<%= link(@text, to: @to, class: \"nav\") %>")
        .unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { text => "A & B", to => "/a?b=1&c=2" })
            .unwrap(),
        "<a href=\"/a?b=1&amp;c=2\" class=\"nav\">A &amp; B</a>"
    );
}

#[test]
fn test_link_with_block() {
    let t = Environment::new()
        .compile("<%= link(to: \"/\") do %><img src=\"<%= @src %>\"><% end %>")
        .unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { src => "logo.png" }).unwrap(),
        "<a href=\"/\"><img src=\"logo.png\"></a>"
    );
}

#[test]
fn test_meta_tag() {
    let t = Environment::new()
        .compile("<%= csrf_meta_tag() %>|<%= csrf_token_value() %>")
        .unwrap();
    assert_eq!(
        t.render_with(&Assigns::new(), &StaticToken::new("a\"b"))
            .unwrap()
            .into_string(),
        "<meta charset=\"UTF-8\" name=\"csrf-token\" content=\"a&quot;b\">|a&quot;b"
    );
}

#[test]
fn test_tags() {
    let t = Environment::new()
        .compile(
            "<%= tag(:br) %>\
             <%= content_tag(:p, @text, class: [\"a\", nil, \"b\"], data: [user_id: 1]) %>\
             <%= img_tag(\"/x.png\", alt: \"<x>\") %>\
             <%= content_tag(:div, hidden: true, title: false) do %>in<% end %>",
        )
        .unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { text => "1 < 2" }).unwrap(),
        "<br>\
         <p class=\"a b\" data-user-id=\"1\">1 &lt; 2</p>\
         <img src=\"/x.png\" alt=\"&lt;x&gt;\">\
         <div hidden>in</div>"
    );
}

#[test]
fn test_text_to_html() {
    let t = Environment::new()
        .compile("<%= text_to_html(@text) %>")
        .unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { text => "Hello\nworld\n\n<b>bye</b>" })
            .unwrap(),
        "<p>Hello<br>\nworld</p>\n<p>&lt;b&gt;bye&lt;/b&gt;</p>\n"
    );
}

#[test]
fn test_escape_helpers() {
    let t = Environment::new()
        .compile(
            "<script>var s = '<%= javascript_escape(@s) %>';</script>\
             <%= safe_to_string(raw(\"<i>\")) %>",
        )
        .unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { s => "it's </script>\n" })
            .unwrap(),
        "<script>var s = 'it\\&#39;s &lt;\\/script&gt;\\n';</script>&lt;i&gt;"
    );
}

#[test]
fn test_helper_errors() {
    let env = Environment::new();
    let err = env
        .compile("<%= link(\"x\") %>")
        .unwrap()
        .render(&Assigns::new())
        .unwrap_err();
    assert!(matches!(err, Error::Function { ref name, .. } if name == "link"), "{err}");

    let err = env
        .compile("<%= tag() %>")
        .unwrap()
        .render(&Assigns::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "tag: expected 1 to 2 argument(s), got 0");
}

use safehtml::{assigns, Assigns, Config, Environment, Error};
use safehtml_testing::{load, template_path};

#[test]
fn test_variables() {
    let t = load("simple.html.eex").unwrap();
    let assigns = assigns! {
        name => "foo",
        num => 42,
        i18n => "Iñtërnâtiônàlizætiøn",
    };
    assert_eq!(
        t.render_to_string(&assigns).unwrap(),
        "hello foo, number 42\n\
         Iñtërnâtiônàlizætiøn is important\n\
         in literals too: Iñtërnâtiônàlizætiøn\n"
    );
    assert_eq!(
        t.name(),
        Some(template_path("simple.html.eex").display().to_string().as_str())
    );
}

#[test]
fn test_end_to_end() {
    let t = load("end_to_end.html.eex").unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { foo => true }).unwrap(),
        "123\n\n  456\n\n789\n"
    );
    assert_eq!(
        t.render_to_string(&assigns! { foo => false }).unwrap(),
        "123\n\n789\n"
    );
}

#[test]
fn test_inline_source_matches_file() {
    let src = "<%= 123 %>\n<%= if @foo do %>\n  <%= 456 %>\n<% end %>\n<%= 789 %>\n";
    let t = Environment::new().compile(src).unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { foo => true }).unwrap(),
        "123\n\n  456\n\n789\n"
    );
}

#[test]
fn test_else() {
    let t = Environment::new()
        .compile("<%= if @cond do %>true<% else %>false<% end %>")
        .unwrap();
    assert_eq!(t.render_to_string(&assigns! { cond => false }).unwrap(), "false");
    assert_eq!(t.render_to_string(&assigns! { cond => 0 }).unwrap(), "true");
    assert_eq!(
        t.render_to_string(&assigns! { cond => safehtml::Value::Nil })
            .unwrap(),
        "false"
    );
}

#[test]
fn test_missing_assign() {
    let t = Environment::new().compile("<%= @foo %>").unwrap();
    let err = t.render(&assigns! { bar => 1 }).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("foo"), "{message}");
    assert!(message.contains("bar"), "{message}");
    assert_eq!(
        message,
        "assign @foo not available in template\n\nAvailable assigns: [:bar]"
    );
}

#[test]
fn test_missing_assign_in_nested_block() {
    let t = Environment::new()
        .compile("<%= if true do %><%= for x <- [1] do %><%= @deep %><% end %><% end %>")
        .unwrap();
    assert!(matches!(
        t.render(&Assigns::new()),
        Err(Error::MissingAssign { key, available }) if key == "deep" && available.is_empty()
    ));
}

#[test]
fn test_missing_assign_in_untaken_branch() {
    let t = Environment::new()
        .compile("<%= if @on do %><%= @other %><% end %>")
        .unwrap();
    assert_eq!(t.render_to_string(&assigns! { on => false }).unwrap(), "");
}

#[test]
fn test_parse_error_names_template() {
    let err = Environment::new()
        .compile_named("page.html.eex", "ok\n<%= if @a do %>")
        .unwrap_err()
        .to_string();
    assert!(err.starts_with("expected `end` to close `if` block"), "{err}");
    assert!(err.contains("page.html.eex:"), "{err}");
}

#[test]
fn test_literal_percent_tag() {
    let t = Environment::new().compile("<%% not a tag %>").unwrap();
    assert_eq!(t.render_to_string(&Assigns::new()).unwrap(), "<% not a tag %>");
}

#[test]
fn test_custom_delimiters() {
    let config = Config::default().with_syntax("{%", "%}").unwrap();
    let t = Environment::with_config(config)
        .compile("<%= @x %>{%= @x %}")
        .unwrap();
    assert_eq!(
        t.render_to_string(&assigns! { x => "<" }).unwrap(),
        "<%= @x %>&lt;"
    );
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        safehtml_testing::load("nope.html.eex"),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_oversized_expressions_are_parse_errors() {
    let env = Environment::new();
    for src in [
        format!("<%= {}true %>", "!".repeat(200_000)),
        format!("<%= @a{} %>", ".b".repeat(200_000)),
        format!("<%= 1{} %>", " * 1".repeat(200_000)),
    ] {
        let err = env.compile(&src).unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "{err}");
        assert!(err.to_string().starts_with("template is nested too deeply"), "{err}");
    }
}

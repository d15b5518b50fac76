use std::collections::BTreeMap;

use safehtml::{assigns, Assigns, Environment, Error, Object, Result, Safe, ToSafe, Value};

fn render(src: &str, assigns: &Assigns) -> Result<String> {
    Environment::new().compile(src)?.render_to_string(assigns)
}

#[test]
fn test_for_loop() {
    let assigns = assigns! { items => vec!["a", "<b>"] };
    assert_eq!(
        render("<%= for item <- @items do %><li><%= item %></li><% end %>", &assigns).unwrap(),
        "<li>a</li><li>&lt;b&gt;</li>"
    );
    assert_eq!(
        render("<%= for _ <- [] do %>x<% end %>", &assigns).unwrap(),
        ""
    );
}

#[test]
fn test_for_skips_non_matching() {
    let results = Value::List(vec![
        Value::Tuple(vec![Value::atom("ok"), Value::Int(1)]),
        Value::Tuple(vec![Value::atom("error"), Value::str("bad")]),
        Value::Tuple(vec![Value::atom("ok"), Value::Int(3)]),
    ]);
    assert_eq!(
        render(
            "<%= for {:ok, n} <- @results do %><%= n %>,<% end %>",
            &assigns! { results => results },
        )
        .unwrap(),
        "1,3,"
    );
}

#[test]
fn test_for_over_map_and_range() {
    let mut map = BTreeMap::new();
    map.insert("b".to_owned(), Value::Int(2));
    map.insert("a".to_owned(), Value::Int(1));
    assert_eq!(
        render(
            "<%= for {k, v} <- @map do %><%= k %>=<%= v %>;<% end %>",
            &assigns! { map => map },
        )
        .unwrap(),
        "a=1;b=2;"
    );
    assert_eq!(
        render("<%= for i <- 3..1 do %><%= i %><% end %>", &Assigns::new()).unwrap(),
        "321"
    );
}

#[test]
fn test_huge_range_is_an_error() {
    let src = "<%= for i <- 0..@n do %><%= i %><% end %>";
    assert!(matches!(
        render(src, &assigns! { n => i64::MAX }),
        Err(Error::BadOperand { op: "..", .. })
    ));
    assert!(matches!(
        render(src, &assigns! { n => i64::MIN }),
        Err(Error::BadOperand { op: "..", .. })
    ));
    assert_eq!(render(src, &assigns! { n => 3 }).unwrap(), "0123");
}

#[test]
fn test_not_enumerable() {
    assert!(matches!(
        render("<%= for x <- @n do %><%= x %><% end %>", &assigns! { n => 1 }),
        Err(Error::NotEnumerable(_))
    ));
}

#[test]
fn test_nested_loops() {
    let table = Value::List(vec![
        Value::from(vec![1, 2]),
        Value::from(vec![3, 4]),
    ]);
    assert_eq!(
        render(
            "<%= for row <- @table do %>[<%= for col <- row do %><%= col * 10 %> <% end %>]<% end %>",
            &assigns! { table => table },
        )
        .unwrap(),
        "[10 20 ][30 40 ]"
    );
}

#[test]
fn test_case() {
    let src = "<%= case @status do %>\
               <% {:ok, n} -> %>ok <%= n %>\
               <% :pending -> %>pending\
               <% \"raw\" -> %>raw\
               <% -1 -> %>negative\
               <% _ -> %>other\
               <% end %>";
    let cases = [
        (Value::Tuple(vec![Value::atom("ok"), Value::Int(7)]), "ok 7"),
        (Value::atom("pending"), "pending"),
        (Value::str("raw"), "raw"),
        (Value::Int(-1), "negative"),
        (Value::Bool(true), "other"),
    ];
    for (status, expected) in cases {
        assert_eq!(render(src, &assigns! { status => status }).unwrap(), expected);
    }
}

#[test]
fn test_case_without_match() {
    let err = render(
        "<%= case @x do %><% 1 -> %>one<% end %>",
        &assigns! { x => 2 },
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "no case clause matching: 2");
}

#[test]
fn test_destructuring() {
    let assigns = assigns! {
        user => Value::Tuple(vec![Value::str("Ann"), Value::from(vec![Value::str("admin")])]),
    };
    assert_eq!(
        render("<% {name, [role]} = @user %><%= name %> (<%= role %>)", &assigns).unwrap(),
        "Ann (admin)"
    );
    assert!(matches!(
        render("<% {name, []} = @user %><%= name %>", &assigns),
        Err(Error::NoMatch(_))
    ));
}

#[test]
fn test_repeated_names_must_agree() {
    let pairs = Value::List(vec![
        Value::Tuple(vec![Value::Int(1), Value::Int(1)]),
        Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
        Value::Tuple(vec![Value::Int(3), Value::Int(3)]),
    ]);
    assert_eq!(
        render(
            "<%= for {x, x} <- @pairs do %><%= x %>;<% end %>",
            &assigns! { pairs => pairs },
        )
        .unwrap(),
        "1;3;"
    );
    assert!(matches!(
        render("<% {a, a} = {1, 2} %><%= a %>", &Assigns::new()),
        Err(Error::NoMatch(_))
    ));
}

#[test]
fn test_scoping() {
    assert_eq!(
        render(
            "<% x = 1 %><%= if true do %><% x = 2 %><%= x %><% end %><%= x %>",
            &Assigns::new(),
        )
        .unwrap(),
        "21"
    );
    assert!(matches!(
        Environment::new().compile("<%= for y <- [1] do %><% end %><%= y %>"),
        Err(Error::Compile(_))
    ));
}

#[test]
fn test_operators() {
    let assigns = assigns! { a => 7, b => 2, s => "x" };
    assert_eq!(
        render(
            "<%= @a + @b * 3 %> <%= (@a + @b) * 3 %> <%= @a / @b %> <%= -@a %> \
             <%= @a > @b and @b >= 2 %> <%= not (@a == 7) %> <%= @s <> \"y\" %>",
            &assigns,
        )
        .unwrap(),
        "13 27 3.5 -7 true false xy"
    );
    assert!(matches!(
        render("<%= @s + 1 %>", &assigns),
        Err(Error::BadOperand { op: "+", .. })
    ));
}

#[test]
fn test_access() {
    let mut user = BTreeMap::new();
    user.insert("name".to_owned(), Value::str("Ann"));
    let assigns = assigns! {
        user => user,
        list => vec![10, 20, 30],
        opts => Value::keywords([("size", 3)]),
    };
    assert_eq!(
        render(
            "<%= @user.name %> <%= @user[\"missing\"] %>|<%= @list[-1] %> <%= @opts[:size] %> <%= @opts.size %>",
            &assigns,
        )
        .unwrap(),
        "Ann |30 3 3"
    );
    assert_eq!(
        render("<%= @user.age %>", &assigns).unwrap_err().to_string(),
        "key :age not found in: %{\"name\" => \"Ann\"}"
    );
}

#[derive(Debug)]
struct User {
    name: String,
    admin: bool,
}

impl ToSafe for User {
    fn to_safe(&self) -> Result<Safe> {
        let mut out = Safe::from_static("<span class=\"user\">");
        out.push_escaped(&self.name);
        out.push_static("</span>");
        Ok(out)
    }
}

impl Object for User {
    fn type_name(&self) -> &'static str {
        "User"
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::str(&self.name)),
            "admin" => Some(Value::Bool(self.admin)),
            _ => None,
        }
    }
}

#[test]
fn test_objects() {
    let user = Value::object(User {
        name: "<Ann>".to_owned(),
        admin: true,
    });
    assert_eq!(
        render(
            "<%= @user %> <%= if @user.admin do %>admin<% end %> <%= @user.name %>",
            &assigns! { user => user },
        )
        .unwrap(),
        "<span class=\"user\">&lt;Ann&gt;</span> admin &lt;Ann&gt;"
    );
}

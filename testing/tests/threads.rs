use std::sync::Arc;
use std::thread;

use safehtml::{assigns, Value};
use safehtml_testing::load;

#[test]
fn test_concurrent_renders() {
    let t = Arc::new(load("teams.html.eex").unwrap());
    let handles = (0..8)
        .map(|n| {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                let teams = Value::List(vec![Value::Tuple(vec![
                    Value::Int(0),
                    Value::keywords([
                        ("name", Value::str(format!("Team <{n}>"))),
                        ("score", Value::Int(n)),
                    ]),
                ])]);
                let assigns = assigns! { year => 2015, teams => teams };
                (n, t.render_to_string(&assigns).unwrap())
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        let (n, out) = handle.join().unwrap();
        assert!(out.contains(&format!("Team &lt;{n}&gt;")), "{out}");
        assert!(out.contains(&format!("</b>: {n}\n")), "{out}");
    }
}

#[test]
fn test_template_is_shareable() {
    fn assert_send_sync<T: Send + Sync + Clone>() {}
    assert_send_sync::<safehtml::Template>();
    assert_send_sync::<safehtml::Environment>();
}

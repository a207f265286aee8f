//! Print wire samples for clients written in other languages.
//!
//! Run with: cargo run --package shellbridge-protocol --example test_vectors

use serde::Serialize;
use shellbridge_protocol::*;

fn main() {
    let type_text = Request::new(
        1,
        Method::Type,
        &TypeParams {
            text: "echo hi".to_string(),
            submit: true,
        },
    )
    .unwrap();
    print_test_vector("request_type", &type_text);

    let send_key = Request::new(
        2,
        Method::SendKey,
        &SendKeyParams {
            key: "ctrl+c".to_string(),
        },
    )
    .unwrap();
    print_test_vector("request_send_key", &send_key);

    let get_content = Request::new(
        3,
        Method::GetContent,
        &GetContentParams { visible_only: true },
    )
    .unwrap();
    print_test_vector("request_get_content_visible", &get_content);

    print_test_vector(
        "response_content",
        &Response::success(
            3,
            serde_json::to_value(ContentResult {
                content: "$ echo hi\nhi\n$".to_string(),
            })
            .unwrap(),
        ),
    );

    print_test_vector(
        "response_screenshot",
        &Response::success(
            4,
            serde_json::to_value(Screenshot {
                content: "$ ".to_string(),
                cursor: CursorPosition { x: 2, y: 0 },
                cols: 80,
                rows: 24,
            })
            .unwrap(),
        ),
    );

    print_test_vector(
        "response_unknown_method",
        &Response::failure(5, "unknown method: frobnicate"),
    );

    print_test_vector("embedded_output", &EmbeddedEvent::output(b"hi\r\n"));
    print_test_vector("embedded_exit", &EmbeddedEvent::Exit { code: Some(0) });
}

fn print_test_vector<T: Serialize>(name: &str, value: &T) {
    let line = encode_line(value).unwrap();
    println!("=== {} ===", name);
    print!("{}", String::from_utf8_lossy(&line));
    println!();
}

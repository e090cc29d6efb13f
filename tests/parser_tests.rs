//! Parser tests for STL.
//!
//! These tests verify correct parsing of every declaration form, plus the
//! round-trip property: pretty-printing a tree and re-parsing it yields a
//! structurally equal tree (checked via a second print).

use pretty_assertions::assert_eq;
use stlang::ast::{Decl, Encoding, EventBody, Expr, Literal, Multiplicity, SourceFile, TypeName};
use stlang::error::ParseError;
use stlang::parser::Parser;

/// Helper to parse a string and return the source file
fn parse(input: &str) -> Result<SourceFile, ParseError> {
    Parser::new(input).parse_source_file()
}

// ============================================
// 1. Module header
// ============================================

#[test]
fn test_module_header() {
    let file = parse("module tls;").expect("parse failed");
    assert_eq!(file.module, "tls");
    assert!(file.decls.is_empty());
}

#[test]
fn test_dotted_module_name() {
    let file = parse("module pkg.tls;").expect("parse failed");
    assert_eq!(file.module, "pkg.tls");
}

#[test]
fn test_missing_module_header() {
    assert!(parse("state sFoo(int) { kA }").is_err());
}

// ============================================
// 2. Constants
// ============================================

#[test]
fn test_const_declarations() {
    let file = parse(
        r#"
module tls;
const int kPort = 4433;
const string kHost = "localhost";
const bool kSecure = true;
const int kAlias = kPort;
"#,
    )
    .expect("parse failed");
    assert_eq!(file.decls.len(), 4);
    match &file.decls[0] {
        Decl::Const(decl) => {
            assert_eq!(decl.name, "kPort");
            assert_eq!(decl.ty, TypeName::Int);
        }
        other => panic!("expected const, got {:?}", other),
    }
}

// ============================================
// 3. States and roles
// ============================================

#[test]
fn test_state_declaration() {
    let file = parse("module tls; state sTlsState(int) { kNotConnected, kConnected }")
        .expect("parse failed");
    match &file.decls[0] {
        Decl::State(decl) => {
            assert_eq!(decl.params, vec![TypeName::Int]);
            assert_eq!(decl.values, vec!["kNotConnected", "kConnected"]);
        }
        other => panic!("expected state, got {:?}", other),
    }
}

#[test]
fn test_parameterless_state() {
    let file = parse("module tls; state sGlobal() { kUp, kDown }").expect("parse failed");
    match &file.decls[0] {
        Decl::State(decl) => assert!(decl.params.is_empty()),
        other => panic!("expected state, got {:?}", other),
    }
}

#[test]
fn test_role_declaration() {
    let file = parse(
        r#"
module tls;
role rSender {
  string ipAddress;
  int port;
}
"#,
    )
    .expect("parse failed");
    match &file.decls[0] {
        Decl::Role(decl) => {
            assert_eq!(decl.fields.len(), 2);
            assert_eq!(decl.fields[0].name, "ipAddress");
            assert_eq!(decl.fields[1].ty, TypeName::Int);
        }
        other => panic!("expected role, got {:?}", other),
    }
}

// ============================================
// 4. Messages
// ============================================

#[test]
fn test_message_with_fields_and_encoding() {
    let file = parse(
        r#"
module tls;
message mRequest {
  encode "json";
  required int requestId;
  optional string note;
  repeated mItem items;
}
message mItem {
  required int id;
}
"#,
    )
    .expect("parse failed");
    match &file.decls[0] {
        Decl::Message(decl) => {
            assert_eq!(decl.encoding, Encoding::Json);
            assert_eq!(decl.fields.len(), 3);
            assert_eq!(decl.fields[0].multiplicity, Multiplicity::Required);
            assert_eq!(decl.fields[2].multiplicity, Multiplicity::Repeated);
            assert_eq!(decl.fields[2].ty, TypeName::Message("mItem".to_string()));
        }
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn test_array_message() {
    let file = parse("module tls; message mBatch[] { required int id; }").expect("parse failed");
    match &file.decls[0] {
        Decl::Message(decl) => assert!(decl.is_array),
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn test_external_message_schema() {
    let file = parse(
        r#"
module tls;
message mHandshake {
  encode "protobuf";
  external "tls.proto.Handshake";
}
"#,
    )
    .expect("parse failed");
    match &file.decls[0] {
        Decl::Message(decl) => {
            assert_eq!(decl.encoding, Encoding::Protobuf);
            assert_eq!(decl.external.as_deref(), Some("tls.proto.Handshake"));
            assert!(decl.fields.is_empty());
        }
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn test_nested_message() {
    let file = parse(
        r#"
module tls;
message mOuter {
  required mInner inner;
  message mInner {
    required int id;
  }
}
"#,
    )
    .expect("parse failed");
    match &file.decls[0] {
        Decl::Message(decl) => {
            assert_eq!(decl.nested.len(), 1);
            assert_eq!(decl.nested[0].name, "mInner");
        }
        other => panic!("expected message, got {:?}", other),
    }
}

#[test]
fn test_unknown_encoding_rejected() {
    let result = parse(r#"module tls; message mBad { encode "xml"; }"#);
    assert!(matches!(result, Err(ParseError::UnknownEncoding { .. })));
}

// ============================================
// 5. Qualifiers and events
// ============================================

#[test]
fn test_qualifier_declaration() {
    let file = parse(
        r#"module tls; qualifier int qUniqueInt() = external "stl.qualifiers.UniqueInt";"#,
    )
    .expect("parse failed");
    match &file.decls[0] {
        Decl::Qualifier(decl) => {
            assert_eq!(decl.return_ty, TypeName::Int);
            assert!(decl.params.is_empty());
            assert_eq!(decl.external, "stl.qualifiers.UniqueInt");
        }
        other => panic!("expected qualifier, got {:?}", other),
    }
}

#[test]
fn test_event_forms() {
    let file = parse(
        r#"
module tls;
event eExternal(int id) = external "stl.events.LogParams";
event eComposite(int id) = eExternal(id);
event eNoOp(int id);
"#,
    )
    .expect("parse failed");
    match (&file.decls[0], &file.decls[1], &file.decls[2]) {
        (Decl::Event(external), Decl::Event(composite), Decl::Event(noop)) => {
            assert!(matches!(external.body, EventBody::External(_)));
            assert!(matches!(composite.body, EventBody::Composite { .. }));
            assert!(matches!(noop.body, EventBody::NoOp));
        }
        other => panic!("expected three events, got {:?}", other),
    }
}

#[test]
fn test_event_reference_parameter() {
    let file = parse(r#"module tls; event eSend(&int requestId, string note);"#)
        .expect("parse failed");
    match &file.decls[0] {
        Decl::Event(decl) => {
            assert!(decl.params[0].by_ref);
            assert!(!decl.params[1].by_ref);
        }
        other => panic!("expected event, got {:?}", other),
    }
}

// ============================================
// 6. Transitions and bindings
// ============================================

#[test]
fn test_full_transition() {
    let file = parse(
        r#"
module tls;
transition tConnect(int sessionId) {
  int requestId;
  pre_states {
    sTlsState(sessionId) = [kNotConnected];
  }
  events {
    rSender -> eConnect(mConnect { requestId = qUniqueInt() -> requestId; }) -> rReceiver;
  }
  post_states {
    sTlsState(sessionId) = kConnected;
  }
  error_states {
    sTlsState(sessionId) = kNotConnected;
  }
}
"#,
    )
    .expect("parse failed");
    match &file.decls[0] {
        Decl::Transition(decl) => {
            assert_eq!(decl.params.len(), 1);
            assert_eq!(decl.locals.len(), 1);
            assert_eq!(decl.pre_states.len(), 1);
            assert_eq!(decl.pre_states[0].values, vec!["kNotConnected"]);
            assert_eq!(decl.events.len(), 1);
            assert_eq!(decl.events[0].source, "rSender");
            assert_eq!(decl.events[0].target, "rReceiver");
            assert_eq!(decl.post_states.len(), 1);
            assert!(decl.error_states.is_some());
        }
        other => panic!("expected transition, got {:?}", other),
    }
}

#[test]
fn test_pre_state_or_set() {
    let file = parse(
        r#"
module tls;
transition tAny() {
  pre_states {
    sTlsState(1) = [kNotConnected, kConnected, kClosing];
    sOther() = kIdle;
  }
}
"#,
    )
    .expect("parse failed");
    match &file.decls[0] {
        Decl::Transition(decl) => {
            assert_eq!(decl.pre_states[0].values.len(), 3);
            // Single-value form without brackets
            assert_eq!(decl.pre_states[1].values, vec!["kIdle"]);
        }
        other => panic!("expected transition, got {:?}", other),
    }
}

#[test]
fn test_transition_binding() {
    let file = parse(r#"module tls; transition tConnectActual = tConnect(1, "host");"#)
        .expect("parse failed");
    match &file.decls[0] {
        Decl::Binding(decl) => {
            assert_eq!(decl.name, "tConnectActual");
            assert_eq!(decl.target, "tConnect");
            assert!(matches!(
                decl.args[0],
                Expr::Literal {
                    value: Literal::Int(1),
                    ..
                }
            ));
        }
        other => panic!("expected binding, got {:?}", other),
    }
}

#[test]
fn test_array_literal_argument() {
    let file = parse(
        r#"
module tls;
event eBatch(mBatch batch) = external "x";
transition tSend() {
  events {
    rA -> eBatch(mBatch [ { id = 1; }, { id = 2; } ]) -> rB;
  }
}
"#,
    )
    .expect("parse failed");
    match &file.decls[1] {
        Decl::Transition(decl) => match &decl.events[0].args[0] {
            Expr::ArrayLit { elements, .. } => assert_eq!(elements.len(), 2),
            other => panic!("expected array literal, got {:?}", other),
        },
        other => panic!("expected transition, got {:?}", other),
    }
}

// ============================================
// 7. Errors
// ============================================

#[test]
fn test_error_reports_position() {
    let err = parse("module tls;\nstate sFoo(int { kA }").unwrap_err();
    match err {
        ParseError::UnexpectedToken { span, .. } => assert_eq!(span.line, 2),
        other => panic!("expected unexpected-token error, got {:?}", other),
    }
}

#[test]
fn test_eof_in_block() {
    let err = parse("module tls; role rSender {").unwrap_err();
    assert!(matches!(err, ParseError::UnexpectedEof { .. }));
}

// ============================================
// 8. Round-trip property
// ============================================

/// Pretty-printing then re-parsing yields a structurally equal tree; since
/// spans differ, equality is checked on the canonical print of both trees.
fn assert_round_trip(source: &str) {
    let first = parse(source).expect("initial parse failed");
    let printed = first.to_string();
    let second = Parser::new(&printed)
        .parse_source_file()
        .unwrap_or_else(|err| panic!("re-parse failed: {}\n---\n{}", err, printed));
    assert_eq!(printed, second.to_string());
}

#[test]
fn test_round_trip_full_program() {
    assert_round_trip(
        r#"
module tls;

const int kSession = 1;
const string kHost = "localhost";

state sTlsState(int) { kNotConnected, kConnected }

role rSender {
  string ipAddress;
  int port;
}

role rReceiver {
  string ipAddress;
}

message mConnect {
  encode "json";
  required int requestId;
  optional string note;
  repeated mItem items;
}

message mItem {
  required int id;
}

message mRaw {
  encode "bytestream";
  external "tls.codecs.Raw";
  required int length;
}

qualifier int qUniqueInt() = external "stl.qualifiers.UniqueInt";

event eConnect(mConnect msg) = external "stl.events.LogParams";
event eWrap(int id) = eConnect(mConnect { requestId = id; });
event eNothing(int id);

transition tConnect(int sessionId) {
  int requestId;
  pre_states {
    sTlsState(sessionId) = [kNotConnected];
  }
  events {
    rSender -> eConnect(mConnect { requestId = qUniqueInt() -> requestId; }) -> rReceiver;
  }
  post_states {
    sTlsState(sessionId) = kConnected;
  }
  error_states {
    sTlsState(sessionId) = kNotConnected;
  }
}

transition tConnectActual = tConnect(kSession);
"#,
    );
}

#[test]
fn test_round_trip_array_literals() {
    assert_round_trip(
        r#"
module tls;
event eBatch(mBatch batch) = external "x";
transition tSend() {
  events {
    rA -> eBatch(mBatch [ { id = 1; }, { id = 2; } ]) -> rB;
  }
}
"#,
    );
}

#[test]
fn test_round_trip_string_escapes() {
    assert_round_trip("module tls;\nconst string kOdd = \"a\\\"b\\\\c\\nd\";\n");
}

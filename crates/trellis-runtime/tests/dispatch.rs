//! End-to-end dispatch through a wrapped class with request-scoped
//! providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use trellis_api::{JsonMap, MethodDescriptor, ParamBinding, ParamPattern};
use trellis_runtime::{provide, wrap_api_class, ApiClass, Provider};

fn create_todo_descriptor() -> Arc<MethodDescriptor> {
    Arc::new(MethodDescriptor {
        name: "createTodo".to_string(),
        http_method: "POST".to_string(),
        path: MethodDescriptor::default_path("TodoService", "createTodo"),
        bindings: vec![ParamBinding {
            pattern: ParamPattern::Identifier {
                name: "title".to_string(),
            },
            optional: false,
        }],
        param_schemas: vec![JsonMap::new()],
        return_schema: JsonMap::new(),
        locations: Vec::new(),
        validators: Vec::new(),
    })
}

#[tokio::test]
async fn provider_resolves_once_per_request_across_dispatches() {
    let resolutions = Arc::new(AtomicUsize::new(0));
    let seen = resolutions.clone();
    let db: Provider<String> = provide(move |_req, _reply| {
        let seen = seen.clone();
        Box::pin(async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok("connection".to_string())
        })
    });

    let handler_db = db.clone();
    let class = ApiClass::named("TodoService").handler("createTodo", move |req, _reply, args| {
        let db = handler_db.clone();
        Box::pin(async move {
            // Two lookups inside one request share a single resolution.
            let first = req.context_get(&db).await?;
            let second = req.context_get(&db).await?;
            assert!(Arc::ptr_eq(&first, &second));
            Ok(json!({ "db": *first, "title": args[0] }))
        })
    });

    let router = wrap_api_class(class, vec![create_todo_descriptor()]).unwrap();

    for title in ["first", "second"] {
        let response = router
            .dispatch("POST", "/TodoService/createTodo", json!({ "p0": title }))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["title"], json!(title));
    }

    // One resolution per request, never shared between them.
    assert_eq!(resolutions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn provider_failure_surfaces_as_a_500() {
    let broken: Provider<String> = provide(|_req, _reply| {
        Box::pin(async { Err("no database".into()) })
    });

    let handler_db = broken.clone();
    let class = ApiClass::named("TodoService").handler("createTodo", move |req, _reply, _args| {
        let db = handler_db.clone();
        Box::pin(async move {
            let conn = req.context_get(&db).await?;
            Ok(json!({ "db": *conn }))
        })
    });

    let router = wrap_api_class(class, vec![create_todo_descriptor()]).unwrap();
    let response = router
        .dispatch("POST", "/TodoService/createTodo", json!({ "p0": "x" }))
        .await
        .unwrap();
    assert_eq!(response.status, 500);
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    Body, ErrorOutcome, Error, FnInterceptor, Interceptor, Pipeline, Request, RequestOutcome,
    Response, ResponseOutcome, StackInfo, Transport,
};
use url::Url;

struct EchoTransport {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for EchoTransport {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = Body::from(format!("echo:{}", request.url()).into_bytes());
        Ok(Response::new(200, request.id().to_string(), body))
    }
}

struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        Err(Error::Transport(format!("boom:{}", request.id()).into()))
    }
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[tokio::test]
async fn basic_round_trip_without_interceptors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline =
        Pipeline::builder().with_transport(EchoTransport { calls: calls.clone() }).build();

    let response =
        pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn response_carries_a_back_reference_to_its_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline =
        Pipeline::builder().with_transport(EchoTransport { calls: calls.clone() }).build();

    let response =
        pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await.unwrap();
    let source = response.source().expect("response stage attaches a source snapshot");
    assert_eq!(source.method, http::Method::GET);
    assert_eq!(source.url.as_str(), "https://server/test");
}

#[tokio::test]
async fn custom_header_injection_is_visible_to_transport() {
    struct HeaderTransport;
    #[async_trait]
    impl Transport for HeaderTransport {
        async fn send(&self, request: Request) -> Result<Response, Error> {
            assert_eq!(request.header("custom-header"), Some("Value"));
            Ok(Response::new(200, request.id().to_string(), Body::empty()))
        }
    }

    let interceptor = FnInterceptor::new().on_request(|mut req| async move {
        req.set_header("custom-header", "Value");
        RequestOutcome::Next(req)
    });

    let pipeline =
        Pipeline::builder().with_interceptor(interceptor).with_transport(HeaderTransport).build();

    let response = pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn request_stage_interceptors_run_in_declared_order() {
    let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let order_a = order.clone();
    let order_b = order.clone();

    let a = FnInterceptor::new().on_request(move |req| {
        let order_a = order_a.clone();
        async move {
            order_a.lock().await.push("a");
            RequestOutcome::Next(req)
        }
    });
    let b = FnInterceptor::new().on_request(move |req| {
        let order_b = order_b.clone();
        async move {
            order_b.lock().await.push("b");
            RequestOutcome::Next(req)
        }
    });

    let pipeline = Pipeline::builder()
        .with_interceptor(a)
        .with_interceptor(b)
        .with_transport(EchoTransport { calls: Arc::new(AtomicUsize::new(0)) })
        .build();

    pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await.unwrap();
    assert_eq!(*order.lock().await, vec!["a", "b"]);
}

#[tokio::test]
async fn response_stage_respects_reverse_response_flag() {
    let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let order_a = order.clone();
    let order_b = order.clone();

    let a = FnInterceptor::new().on_response(move |res| {
        let order_a = order_a.clone();
        async move {
            order_a.lock().await.push("a");
            ResponseOutcome::Next(res)
        }
    });
    let b = FnInterceptor::new().on_response(move |res| {
        let order_b = order_b.clone();
        async move {
            order_b.lock().await.push("b");
            ResponseOutcome::Next(res)
        }
    });

    let pipeline = Pipeline::builder()
        .with_interceptor(a)
        .with_interceptor(b)
        .with_transport(EchoTransport { calls: Arc::new(AtomicUsize::new(0)) })
        .reverse_response(true)
        .build();

    pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await.unwrap();
    assert_eq!(*order.lock().await, vec!["b", "a"]);
}

#[tokio::test]
async fn resolve_with_skip_bypasses_transport_and_response_stage() {
    let calls = Arc::new(AtomicUsize::new(0));
    let resolver = FnInterceptor::new().on_request(|req| async move {
        let response = Response::new(200, req.id().to_string(), Body::from("cached".as_bytes().to_vec()));
        RequestOutcome::Resolve { response, skip_remaining_response_stages: true }
    });

    let pipeline = Pipeline::builder()
        .with_interceptor(resolver)
        .with_transport(EchoTransport { calls: calls.clone() })
        .build();

    let response = pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resolve_and_next_returns_immediately_and_forwards_in_background() {
    let calls = Arc::new(AtomicUsize::new(0));
    let resolver = FnInterceptor::new().on_request(|req| async move {
        let response = Response::new(200, req.id().to_string(), Body::from("stale".as_bytes().to_vec()));
        RequestOutcome::ResolveAndNext { request: req, response }
    });

    let pipeline = Pipeline::builder()
        .with_interceptor(resolver)
        .with_transport(EchoTransport { calls: calls.clone() })
        .build();

    let response = pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await.unwrap();
    assert_eq!(response.into_parts().body.into_bytes().await.unwrap(), bytes::Bytes::from_static(b"stale"));

    // background revalidation happens independently; give it a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reject_without_skip_reaches_error_stage_which_can_resolve() {
    let rejecting = FnInterceptor::new().on_request(|req| async move {
        RequestOutcome::Reject {
            error: Error::Interceptor("first interceptor failed".into()),
            skip_remaining_error_stages: false,
        }
    });
    let recovering = FnInterceptor::new().on_error(|_req, _error, _stack| async move {
        let response = Response::new(
            200,
            "synthetic".to_string(),
            Body::from("An error occurred. Recovered by error stage.".as_bytes().to_vec()),
        );
        ErrorOutcome::Resolve(response)
    });

    let pipeline = Pipeline::builder()
        .with_interceptor(rejecting)
        .with_interceptor(recovering)
        .with_transport(FailingTransport)
        .build();

    let response = pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn reject_with_skip_propagates_error_directly() {
    let rejecting = FnInterceptor::new().on_request(|_req| async move {
        RequestOutcome::Reject {
            error: Error::Interceptor("nope".into()),
            skip_remaining_error_stages: true,
        }
    });
    let recovering = FnInterceptor::new().on_error(|req, error, _stack: StackInfo| async move {
        ErrorOutcome::Next(req, error)
    });

    let pipeline = Pipeline::builder()
        .with_interceptor(rejecting)
        .with_interceptor(recovering)
        .with_transport(FailingTransport)
        .build();

    let result = pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn transport_failure_without_recovery_propagates() {
    let pipeline = Pipeline::builder().with_transport(FailingTransport).build();
    let result = pipeline.send(Request::new(http::Method::GET, url("https://server/test"))).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn close_disposes_interceptors() {
    struct DisposeTracking(Arc<AtomicUsize>);
    #[async_trait]
    impl Interceptor for DisposeTracking {
        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let disposed = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::builder()
        .with_interceptor(DisposeTracking(disposed.clone()))
        .with_transport(EchoTransport { calls: Arc::new(AtomicUsize::new(0)) })
        .build();

    pipeline.close();
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

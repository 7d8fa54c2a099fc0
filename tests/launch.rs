use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;

use vermilion_runtime::catalog::current_environment;
use vermilion_runtime::msg::{self, Request, Response, START_METHOD};
use vermilion_runtime::{
    AckPolicy, ErrorKind, LaunchConfig, LaunchState, Launcher, RetryPolicy, ServiceCatalog,
    ServiceDescriptor, StartService, SupervisorClient, TcpDialer,
};

type Requests = Arc<Mutex<Vec<Request>>>;

/// A stand-in supervisor that answers every request with `reply`, on one connection
async fn fake_supervisor<F>(reply: F) -> (String, Requests)
where
    F: Fn(&Request) -> Response + Send + 'static,
{
    let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let requests = Requests::default();

    let seen = Arc::clone(&requests);
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        while let Ok(request) = msg::recv_msg::<_, Request>(&mut socket).await {
            let response = reply(&request);
            seen.lock().unwrap().push(request);

            if msg::send_msg(&mut socket, &response).await.is_err() {
                break;
            }
        }
    });

    (address, requests)
}

fn ok(code: i32) -> impl Fn(&Request) -> Response {
    move |request| Response {
        seq: request.seq,
        result: Ok(code),
    }
}

fn config(address: String, ack: AckPolicy) -> LaunchConfig {
    LaunchConfig {
        address,
        retry: RetryPolicy::new(3, Duration::from_millis(10)).unwrap(),
        settle_delay: Duration::from_millis(20),
        ack,
    }
}

fn catalog() -> ServiceCatalog {
    ServiceCatalog::new(
        vec!["api", "web", "registry"],
        vec!["proxy", "store"],
        vec!["accounts"],
    )
}

fn names(requests: &Requests) -> Vec<String> {
    requests
        .lock()
        .unwrap()
        .iter()
        .map(|request| request.body.service_name.clone())
        .collect()
}

#[tokio::test]
async fn test_launch_over_tcp() {
    let (address, requests) = fake_supervisor(ok(0)).await;
    let config = config(address, AckPolicy::Accept);
    let mut launcher = Launcher::new(catalog(), config.clone());

    launcher
        .run(TcpDialer::new(config.ack))
        .await
        .expect("launch failed");

    assert_eq!(launcher.state(), LaunchState::Done);
    assert_eq!(
        names(&requests),
        vec!["api", "web", "registry", "proxy", "store", "accounts"]
    );

    let requests = requests.lock().unwrap();
    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request.seq, i as u64 + 1);
        assert_eq!(request.method, START_METHOD);
        assert_eq!(request.body.args, vec![request.body.service_name.clone()]);
    }

    let expected_env = ServiceDescriptor::with_environment("api", current_environment()).env_pairs();
    assert_eq!(requests[0].body.environment, expected_env);
}

#[tokio::test]
async fn test_any_ack_accepted_by_default() {
    let (address, requests) = fake_supervisor(ok(7)).await;
    let mut launcher = Launcher::new(catalog(), config(address, AckPolicy::Accept));

    launcher
        .run(TcpDialer::new(AckPolicy::Accept))
        .await
        .expect("launch failed");

    assert_eq!(names(&requests).len(), 6);
}

#[tokio::test]
async fn test_strict_ack_rejects_non_zero() {
    let (address, requests) = fake_supervisor(|request: &Request| Response {
        seq: request.seq,
        result: Ok(if request.body.service_name == "web" { 1 } else { 0 }),
    })
    .await;
    let mut launcher = Launcher::new(catalog(), config(address, AckPolicy::RequireZero));

    let err = launcher
        .run(TcpDialer::new(AckPolicy::RequireZero))
        .await
        .expect_err("rejection ignored");

    match err.kind() {
        ErrorKind::Rejected { service, code } => {
            assert_eq!(service, "web");
            assert_eq!(*code, 1);
        }
        kind => panic!("unexpected error: {:?}", kind),
    }
    assert_eq!(launcher.state(), LaunchState::Fatal);
    assert_eq!(names(&requests), vec!["api", "web"]);
}

#[tokio::test]
async fn test_remote_error_is_fatal() {
    let (address, requests) = fake_supervisor(|request: &Request| Response {
        seq: request.seq,
        result: if request.body.service_name == "store" {
            Err("exec: store: not found".to_string())
        } else {
            Ok(0)
        },
    })
    .await;
    let mut launcher = Launcher::new(catalog(), config(address, AckPolicy::Accept));

    let err = launcher
        .run(TcpDialer::new(AckPolicy::Accept))
        .await
        .expect_err("remote error ignored");

    assert!(matches!(err.kind(), ErrorKind::Remote { .. }));
    assert_eq!(launcher.state(), LaunchState::Fatal);
    assert_eq!(names(&requests), vec!["api", "web", "registry", "proxy", "store"]);
}

#[tokio::test]
async fn test_unreachable_supervisor() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut launcher = Launcher::new(catalog(), config(address, AckPolicy::Accept));
    let err = launcher
        .run(TcpDialer::default())
        .await
        .expect_err("connected to nothing");

    assert!(err.is_exhausted());
    assert!(matches!(err.kind(), ErrorKind::Exhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_mismatched_reply_seq() {
    let (address, _) = fake_supervisor(|request: &Request| Response {
        seq: request.seq + 41,
        result: Ok(0),
    })
    .await;

    let stream = tokio::net::TcpStream::connect(address.as_str()).await.unwrap();
    let mut client = SupervisorClient::new(stream, AckPolicy::Accept);

    let err = client
        .start(&ServiceDescriptor::new("ocs"))
        .await
        .expect_err("mismatched reply accepted");
    assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
}

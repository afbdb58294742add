//! The HTTP transport against an in-process stub server speaking the wire
//! contract: windowed GET fetches, form-encoded edit batches, fire-and-forget
//! protection and link endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use mural::coords::{AbsoluteCell, TileRect};
use mural::transport::{HttpWorldApi, PushError, WorldApi};
use mural_proto::{CellCoord, Edit, LinkTarget, TILE_CELLS, TileCoord, TileKey};
use serde_json::json;

type Seen = Arc<Mutex<Vec<String>>>;

async fn route(req: Request<Body>, seen: Seen) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    seen.lock().unwrap().push(format!("{method} {path}?{query}"));

    let response = match (method, path.as_str()) {
        (Method::GET, "/sandbox") if query.contains("fetch=1") => {
            let body = json!({
                "0,0": {
                    "content": "y".repeat(TILE_CELLS),
                    "properties": {"protected": true}
                },
                "0,1": null
            });
            json_response(StatusCode::OK, body.to_string())
        }
        (Method::POST, "/sandbox") => {
            let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
            let acks: Vec<serde_json::Value> = url::form_urlencoded::parse(&body)
                .filter(|(key, _)| key == "edits")
                .map(|(_, value)| {
                    let fields: Vec<&str> = value.splitn(6, ',').collect();
                    json!([
                        fields[0].parse::<i64>().unwrap(),
                        fields[1].parse::<i64>().unwrap(),
                        fields[2].parse::<i64>().unwrap(),
                        fields[3].parse::<i64>().unwrap(),
                        fields[4].parse::<i64>().unwrap(),
                        fields[5],
                    ])
                })
                .collect();
            json_response(StatusCode::OK, serde_json::Value::Array(acks).to_string())
        }
        (Method::POST, "/readonly") => json_response(StatusCode::FORBIDDEN, "\"No permission\"".into()),
        (Method::POST, "/ajax/protect/")
        | (Method::POST, "/ajax/unprotect/")
        | (Method::POST, "/ajax/coordlink/")
        | (Method::POST, "/ajax/urllink/") => json_response(StatusCode::OK, "null".into()),
        _ => json_response(StatusCode::NOT_FOUND, "null".into()),
    };
    Ok(response)
}

fn json_response(status: StatusCode, body: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn start_server() -> (SocketAddr, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let for_service = seen.clone();
    let make = make_service_fn(move |_conn| {
        let seen = for_service.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| route(req, seen.clone())))
        }
    });
    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make);
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, seen)
}

#[tokio::test]
async fn fetch_sends_window_bounds_and_parses_the_refresh() {
    let (addr, seen) = start_server();
    let api = HttpWorldApi::new(&format!("http://{addr}"), "sandbox").unwrap();
    let bounds = TileRect {
        min_y: -1,
        min_x: -2,
        max_y: 3,
        max_x: 4,
    };
    let refresh = api.fetch_tiles(bounds).await.unwrap();
    assert_eq!(refresh.len(), 2);
    let full = refresh[&TileKey(TileCoord::new(0, 0))].as_ref().unwrap();
    assert!(full.properties.protected);
    assert_eq!(full.content.as_deref().unwrap().len(), TILE_CELLS);

    let requests = seen.lock().unwrap();
    let fetch = requests.iter().find(|line| line.contains("fetch=1")).unwrap();
    assert!(fetch.contains("min_tileY=-1"));
    assert!(fetch.contains("min_tileX=-2"));
    assert!(fetch.contains("max_tileY=3"));
    assert!(fetch.contains("max_tileX=4"));
    assert!(fetch.contains("v=3"));
}

#[tokio::test]
async fn push_round_trips_the_batch_as_acknowledgements() {
    let (addr, _seen) = start_server();
    let api = HttpWorldApi::new(&format!("http://{addr}"), "sandbox").unwrap();
    let edits = vec![
        Edit {
            tile: TileCoord::new(0, 0),
            cell: CellCoord::new(0, 0),
            timestamp: 1_234,
            ch: 'a',
        },
        Edit {
            tile: TileCoord::new(-2, 9),
            cell: CellCoord::new(7, 15),
            timestamp: 5_678,
            // A comma must survive the comma-joined form encoding.
            ch: ',',
        },
    ];
    let acks = api.push_edits(edits.clone()).await.unwrap();
    assert_eq!(acks, edits);
}

#[tokio::test]
async fn forbidden_push_maps_to_permission_denied() {
    let (addr, _seen) = start_server();
    let api = HttpWorldApi::new(&format!("http://{addr}"), "readonly").unwrap();
    let err = api
        .push_edits(vec![Edit {
            tile: TileCoord::new(0, 0),
            cell: CellCoord::new(0, 0),
            timestamp: 1,
            ch: 'x',
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, PushError::PermissionDenied));
}

#[tokio::test]
async fn protection_and_links_hit_their_endpoints() {
    let (addr, seen) = start_server();
    let api = HttpWorldApi::new(&format!("http://{addr}"), "sandbox").unwrap();
    api.protect_tile(TileCoord::new(4, -4)).await;
    api.unprotect_tile(TileCoord::new(4, -4)).await;
    api.create_link(
        AbsoluteCell::new(TileCoord::new(0, 0), CellCoord::new(1, 2)),
        LinkTarget::Coord { tile_y: 8, tile_x: 9 },
    )
    .await;
    api.create_link(
        AbsoluteCell::new(TileCoord::new(0, 0), CellCoord::new(1, 3)),
        LinkTarget::Url {
            url: "http://example.com".into(),
        },
    )
    .await;

    let requests = seen.lock().unwrap();
    assert!(requests.iter().any(|line| line.contains("/ajax/protect/")));
    assert!(requests.iter().any(|line| line.contains("/ajax/unprotect/")));
    assert!(requests.iter().any(|line| line.contains("/ajax/coordlink/")));
    assert!(requests.iter().any(|line| line.contains("/ajax/urllink/")));
}

//! # Peer Wire API
//!
//! HTTP face of the peer protocol. Each route decodes into a
//! [`WireRequest`] and hands it to the subsystem's [`PeerRequestHandler`];
//! the [`WireReply`] comes back out with its protocol headers.
//!
//! Every path is nested under [`PEER_API_PREFIX`] (`/v1`).
//!
//! | Method | Path                       | Request              |
//! |--------|----------------------------|----------------------|
//! | GET    | `/peer/list`               | `GetPeers`           |
//! | GET    | `/peer/blocks?height&limit`| `GetBlocks`          |
//! | GET    | `/peer/blocks/common?ids`  | `GetCommonBlocks`    |
//! | GET    | `/peer/status`             | `GetStatus`          |
//! | POST   | `/peer/blocks`             | `PostBlock`          |
//! | POST   | `/peer/transactions`       | `PostTransactions`   |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dc_01_peer_network::domain::{PostBlockBody, PostTransactionsBody};
use dc_01_peer_network::{
    PeerRequestHandler, ProtocolHeaders, WireReply, WireRequest, PEER_API_PREFIX,
};
use node_telemetry::metrics::PEER_REQUEST_DURATION;
use node_telemetry::time_histogram;
use serde::Deserialize;
use shared_types::BlockId;
use tracing::trace;

type PeerState = Arc<dyn PeerRequestHandler>;

pub fn peer_router(handler: PeerState) -> Router {
    let routes = Router::new()
        .route("/peer/list", get(get_peers))
        .route("/peer/blocks", get(get_blocks).post(post_block))
        .route("/peer/blocks/common", get(get_common_blocks))
        .route("/peer/status", get(get_status))
        .route("/peer/transactions", post(post_transactions));
    Router::new().nest(PEER_API_PREFIX, routes).with_state(handler)
}

#[derive(Debug, Deserialize)]
pub struct BlocksQuery {
    pub height: u64,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CommonBlocksQuery {
    /// Comma separated hex block ids.
    pub ids: String,
}

async fn get_peers(
    State(handler): State<PeerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    dispatch(handler, remote, &headers, WireRequest::GetPeers).await
}

async fn get_blocks(
    State(handler): State<PeerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<BlocksQuery>,
) -> Response {
    // The responder caps the limit.
    let request = WireRequest::GetBlocks {
        from_height: query.height,
        limit: query.limit.unwrap_or(u64::MAX),
    };
    dispatch(handler, remote, &headers, request).await
}

async fn get_common_blocks(
    State(handler): State<PeerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<CommonBlocksQuery>,
) -> Response {
    let ids = match parse_ids(&query.ids) {
        Ok(ids) => ids,
        Err(message) => return bad_request(&message),
    };
    dispatch(handler, remote, &headers, WireRequest::GetCommonBlocks { ids }).await
}

async fn get_status(
    State(handler): State<PeerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    dispatch(handler, remote, &headers, WireRequest::GetStatus).await
}

async fn post_block(
    State(handler): State<PeerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<PostBlockBody>,
) -> Response {
    let request = WireRequest::PostBlock {
        block: Box::new(body.block),
    };
    dispatch(handler, remote, &headers, request).await
}

async fn post_transactions(
    State(handler): State<PeerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<PostTransactionsBody>,
) -> Response {
    let request = WireRequest::PostTransactions {
        transactions: body.transactions,
    };
    dispatch(handler, remote, &headers, request).await
}

async fn dispatch(
    handler: PeerState,
    remote: SocketAddr,
    headers: &HeaderMap,
    request: WireRequest,
) -> Response {
    let _timer = time_histogram!(PEER_REQUEST_DURATION, request.name());
    trace!(peer = %remote, request = request.name(), "[dc-01] inbound request");

    let protocol = ProtocolHeaders::from_lookup(|name| {
        headers.get(name).and_then(|value| value.to_str().ok())
    });
    let reply = handler.handle(remote.ip(), protocol, request).await;
    into_response(reply)
}

fn parse_ids(raw: &str) -> Result<Vec<BlockId>, String> {
    let ids = raw
        .split(',')
        .filter(|id| !id.is_empty())
        .map(|id| BlockId::from_hex(id).map_err(|e| format!("bad block id {id:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err("no block ids".into());
    }
    Ok(ids)
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "success": false, "message": message })),
    )
        .into_response()
}

fn into_response(reply: WireReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = if reply.body.is_null() {
        status.into_response()
    } else {
        (status, Json(reply.body)).into_response()
    };
    if let Some(protocol) = reply.headers {
        let map = response.headers_mut();
        for (name, value) in protocol.pairs() {
            if let Ok(value) = HeaderValue::from_str(&value) {
                map.insert(HeaderName::from_static(name), value);
            }
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_01_peer_network::domain::{BlocksReply, CommonBlockReply, StatusReply};
    use dc_01_peer_network::test_utils::{
        build_chain, test_config, test_context_with, AcceptAllVerifier, FixedTimeSource,
        MockChain, RecordingSink, SimulatedNetwork, TEST_NETHASH, TEST_PORT, TEST_VERSION,
    };
    use dc_01_peer_network::{HttpTransport, NetworkMonitor, PeerResponder, PeerTransport};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    async fn serve() -> (SocketAddr, Arc<RecordingSink>) {
        let network = SimulatedNetwork::new();
        let ctx = test_context_with(
            network.transport_for(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            Arc::new(MockChain::new(build_chain(30, 1))),
            Arc::new(FixedTimeSource::new(240)),
            test_config(),
            Arc::new(AcceptAllVerifier),
        );
        let monitor = NetworkMonitor::new(ctx);
        let sink = Arc::new(RecordingSink::default());
        let responder: PeerState = Arc::new(PeerResponder::new(&monitor, sink.clone(), sink.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = peer_router(responder).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (address, sink)
    }

    fn headers() -> ProtocolHeaders {
        ProtocolHeaders::new(TEST_NETHASH, TEST_VERSION, TEST_PORT)
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_status_round_trip_over_http() {
        let (address, _) = serve().await;
        let reply = transport()
            .send(address, &headers(), &WireRequest::GetStatus)
            .await
            .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.headers.unwrap().nethash, TEST_NETHASH);
        let status: StatusReply = serde_json::from_value(reply.body).unwrap();
        assert_eq!(status.height, 30);
    }

    #[tokio::test]
    async fn test_blocks_and_common_blocks() {
        let (address, _) = serve().await;
        let chain = build_chain(30, 1);

        let reply = transport()
            .send(address, &headers(), &WireRequest::GetBlocks { from_height: 10, limit: 5 })
            .await
            .unwrap();
        let blocks: BlocksReply = serde_json::from_value(reply.body).unwrap();
        let heights: Vec<u64> = blocks.blocks.iter().map(|b| b.height()).collect();
        assert_eq!(heights, vec![11, 12, 13, 14, 15]);

        let ids = vec![chain[4].id(), chain[19].id()];
        let reply = transport()
            .send(address, &headers(), &WireRequest::GetCommonBlocks { ids })
            .await
            .unwrap();
        let common: CommonBlockReply = serde_json::from_value(reply.body).unwrap();
        assert_eq!(common.common.map(|c| c.height), Some(20));
        assert_eq!(common.last_block_height, 30);
    }

    #[tokio::test]
    async fn test_posted_block_reaches_the_sink() {
        let (address, sink) = serve().await;
        let block = build_chain(31, 1).pop().unwrap();
        let reply = transport()
            .send(
                address,
                &headers(),
                &WireRequest::PostBlock {
                    block: Box::new(block.clone()),
                },
            )
            .await
            .unwrap();

        assert!(reply.is_success());
        let received = sink.blocks();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, block);
        assert_eq!(received[0].1, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[tokio::test]
    async fn test_wrong_network_is_refused() {
        let (address, _) = serve().await;
        let reply = transport()
            .send(
                address,
                &ProtocolHeaders::new("mainnet", TEST_VERSION, TEST_PORT),
                &WireRequest::GetPeers,
            )
            .await
            .unwrap();
        assert_eq!(reply.status, 400);
    }

    #[tokio::test]
    async fn test_malformed_requests_are_rejected() {
        let (address, _) = serve().await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{address}/v1/peer/blocks/common?ids=nothex"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);

        let response = client
            .get(format!("http://{address}/v1/peer/blocks?height=abc"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);

        // Well formed but without protocol headers.
        let response = client
            .get(format!("http://{address}/v1/peer/status"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_unversioned_paths_are_not_served() {
        let (address, _) = serve().await;
        let response = reqwest::Client::new()
            .get(format!("http://{address}/peer/status"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);

        let reply = transport()
            .send(
                address,
                &ProtocolHeaders::new(TEST_NETHASH, TEST_VERSION, TEST_PORT),
                &WireRequest::GetStatus,
            )
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
    }

    #[test]
    fn test_parse_ids() {
        let id = BlockId::new([9; 32]);
        assert_eq!(parse_ids(&format!("{},", id.to_hex())).unwrap(), vec![id]);
        assert!(parse_ids("").is_err());
        assert!(parse_ids("zz").is_err());
    }
}

//! HTTP endpoint serving the finished report file.

use anyhow::{Context, Result};
use certscan_core::CancelSignal;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

pub fn report_route(report: &Path) -> String {
    let name = report.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    format!("/{name}")
}

/// `GET /<file name>` with the report body. Other paths get a 404 and other
/// methods the default 405 rejection.
pub fn report_filter(
    report: PathBuf,
    content_type: &'static str,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let route = report_route(&report);
    warp::get().and(warp::path::full()).and_then(move |path: FullPath| {
        let route = route.clone();
        let report = report.clone();
        async move { Ok::<_, Rejection>(respond(path.as_str(), &route, &report, content_type).await) }
    })
}

async fn respond(path: &str, route: &str, report: &Path, content_type: &'static str) -> Response {
    if path != route {
        return warp::reply::with_status("not found\n", StatusCode::NOT_FOUND).into_response();
    }
    // Read per request so the file on disk is always what gets served.
    match tokio::fs::read(report).await {
        Ok(body) => warp::reply::with_header(body, "content-type", content_type).into_response(),
        Err(e) => {
            let msg = format!("{} file error {}\n", report.display(), e);
            warp::reply::with_status(msg, StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// Bind the report endpoint on `addr`. The returned future runs the server
/// until `cancel` is raised.
pub fn bind_report(
    addr: SocketAddr,
    report: PathBuf,
    content_type: &'static str,
    cancel: CancelSignal,
) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let route = report_route(&report);
    let (bound, server) = warp::serve(report_filter(report, content_type))
        .try_bind_with_graceful_shutdown(addr, async move { cancel.cancelled().await })
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %bound, route = %route, "serving report");
    Ok((bound, server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn route_is_the_file_name() {
        assert_eq!(report_route(Path::new("/var/tmp/results.csv")), "/results.csv");
        assert_eq!(report_route(Path::new("out.txt")), "/out.txt");
    }

    #[tokio::test]
    async fn serves_the_report_and_rejects_other_paths() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"host,common_name\n").unwrap();
        let route = report_route(f.path());
        let filter = report_filter(f.path().to_path_buf(), "text/csv");

        let ok = warp::test::request().path(&format!("{route}?x=1")).reply(&filter).await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()["content-type"], "text/csv");
        assert_eq!(&ok.body()[..], b"host,common_name\n");

        let missing = warp::test::request().path("/other").reply(&filter).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let post = warp::test::request().method("POST").path(&route).reply(&filter).await;
        assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unreadable_report_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let filter = report_filter(dir.path().join("results.csv"), "text/csv");
        let resp = warp::test::request().path("/results.csv").reply(&filter).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(String::from_utf8_lossy(resp.body()).contains("results.csv file error"));
    }

    #[tokio::test]
    async fn end_to_end_over_tcp() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"report body").unwrap();
        let route = report_route(f.path());
        let cancel = CancelSignal::new();
        let (addr, server) =
            bind_report("127.0.0.1:0".parse().unwrap(), f.path().to_path_buf(), "text/plain", cancel.clone()).unwrap();
        let server = tokio::spawn(server);

        // request line split across two writes
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GE").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.write_all(format!("T {route} HTTP/1.0\r\n\r\n").as_bytes()).await.unwrap();
        let mut resp = String::new();
        client.read_to_string(&mut resp).await.unwrap();
        assert!(resp.lines().next().is_some_and(|l| l.ends_with(" 200 OK")), "{resp}");
        assert!(resp.ends_with("report body"));

        cancel.cancel();
        server.await.unwrap();
    }
}

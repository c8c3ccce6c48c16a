//! Server-wide pages

use std::fmt::Write;

use chrono::Local;

use super::escape_html;
use crate::error::Result;
use crate::server::engine::Server;
use crate::server::http::{Request, Response};
use crate::server::resource::Resource;

/// `/`: links to every program
pub fn landing(server: &mut Server, _resource: &Resource, _req: &Request) -> Result<Response> {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>fragcast</title>\n\
         <link rel=\"stylesheet\" href=\"/style.css\">\n</head>\n<body>\n<h1>Programs</h1>\n<ul>\n",
    );
    for program in server.programs.iter() {
        let name = escape_html(&program.name);
        writeln!(
            html,
            "<li><a href=\"/{}\">{}</a> ({})</li>",
            name,
            name,
            program.state.as_str()
        )?;
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    Ok(Response::html(html))
}

/// `/list`: program names, one per line
pub fn program_list(server: &mut Server, _resource: &Resource, _req: &Request) -> Result<Response> {
    let body: String = server
        .programs
        .iter()
        .map(|p| format!("{}\n", p.name))
        .collect();
    Ok(Response::text(body))
}

/// `/log`: server time followed by the recent messages
pub fn log_page(server: &mut Server, _resource: &Resource, _req: &Request) -> Result<Response> {
    let mut body = format!("Server time: {}\n", Local::now().to_rfc2822());
    for message in server.log.messages() {
        body.push_str(message);
        body.push('\n');
    }
    Ok(Response::text(body))
}

#[cfg(test)]
mod tests {
    use crate::program::ProgramKind;
    use crate::server::{events, Request, Server, ServerConfig};
    use http::StatusCode;

    fn server() -> Server {
        let (tx, _rx) = events::channel();
        Server::new(ServerConfig::default(), tx)
    }

    #[test]
    fn test_program_list() {
        let mut server = server();
        server.add_program("news", ProgramKind::Manual).unwrap();
        server.add_program("sport", ProgramKind::Manual).unwrap();

        let res = server.handle_request(Request::get("/list"));
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(&res.body_bytes()[..], b"news\nsport\n");
    }

    #[test]
    fn test_landing_links_programs() {
        let mut server = server();
        server.add_program("news", ProgramKind::Manual).unwrap();

        let res = server.handle_request(Request::get("/"));
        let body = String::from_utf8(res.body_bytes().to_vec()).unwrap();
        assert!(body.contains("<a href=\"/news\">news</a> (stopped)"));
        assert!(body.contains("/style.css"));
    }

    #[test]
    fn test_log_page() {
        let mut server = server();
        server.append_log(Some("news"), "hello");
        let admin = server.create_session(true);

        let res = server.handle_request(Request::get(&format!("/log?session_id={}", admin)).tls(true));
        let body = String::from_utf8(res.body_bytes().to_vec()).unwrap();
        let mut lines = body.lines();
        assert!(lines.next().unwrap().starts_with("Server time: "));
        assert!(lines.next().unwrap().ends_with(": news: hello"));
    }
}

//! Program and stream resources

use std::fmt::Write;

use http::header::CONTENT_TYPE;

use super::escape_html;
use crate::error::{Error, Result};
use crate::program::follow::render_stream_list;
use crate::program::{Program, StreamType};
use crate::registry::HandoffTarget;
use crate::server::engine::{Server, STILL_BOUNDARY};
use crate::server::http::{Request, Response};
use crate::server::resource::{Resource, ResourceOwner};

/// Header naming an Icecast source
const ICE_NAME: &str = "ice-name";

fn owning_program<'a>(server: &'a Server, resource: &Resource) -> Result<&'a Program> {
    resource
        .owner
        .program()
        .and_then(|name| server.programs.get(name))
        .ok_or_else(|| Error::not_found(resource.location.clone()))
}

fn owning_stream(resource: &Resource) -> Result<(&str, usize)> {
    match &resource.owner {
        ResourceOwner::Stream { program, index } => Ok((program, *index)),
        _ => Err(Error::not_found(resource.location.clone())),
    }
}

/// `/{program}`: stream overview
pub fn page(server: &mut Server, resource: &Resource, _req: &Request) -> Result<Response> {
    let program = owning_program(server, resource)?;
    let name = escape_html(&program.name);

    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{}</title>\n\
         <link rel=\"stylesheet\" href=\"/style.css\">\n</head>\n<body>\n\
         <h1>{}</h1>\n<p>State: {}</p>\n<ul>\n",
        name,
        name,
        program.state.as_str()
    );
    for stream in &program.streams {
        writeln!(
            html,
            "<li><a href=\"{}\">{}x{} {} kbps {}</a> (<a href=\"{}\">playlist</a>, {} clients)</li>",
            escape_html(&stream.location),
            stream.width,
            stream.height,
            stream.bitrate / 1000,
            stream.stream_type.content_type(),
            escape_html(&stream.playlist),
            stream.metrics.n_clients
        )?;
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    Ok(Response::html(html))
}

/// `PUT`/`SOURCE /{program}`: accept a live source
pub fn ingest(server: &mut Server, resource: &Resource, req: &Request) -> Result<Response> {
    let name = owning_program(server, resource)?.name.clone();
    let icecast = req.is_source() || req.header_str(ICE_NAME).is_some();
    let stream_type = req
        .header_str(CONTENT_TYPE.as_str())
        .map(StreamType::from_content_type)
        .unwrap_or(StreamType::OggTheoraVorbis);

    let mode = server.begin_ingest(&name, req.client, icecast, stream_type)?;
    tracing::info!(program = %name, client = req.client.0, icecast = icecast, "Source connected");
    Ok(Response::ingest(mode))
}

/// `/{program}.frag`: embeddable player fragment
pub fn frag(server: &mut Server, resource: &Resource, _req: &Request) -> Result<Response> {
    if !server.config.enable_programs {
        return Err(Error::Disabled);
    }
    let program = owning_program(server, resource)?;

    let mut html = String::from("<video controls autoplay>\n");
    for stream in &program.streams {
        writeln!(
            html,
            "<source src=\"{}\" type=\"{}\">",
            escape_html(&stream.location),
            stream.stream_type.content_type()
        )?;
    }
    html.push_str("</video>\n");
    Ok(Response::html(html))
}

/// `/{program}.list`: the stream list followers consume
pub fn stream_list(server: &mut Server, resource: &Resource, _req: &Request) -> Result<Response> {
    let program = owning_program(server, resource)?;
    Ok(Response::text(render_stream_list(&program.streams)))
}

/// `/{program}-snapshot.png`: the last still image
pub fn snapshot_png(server: &mut Server, resource: &Resource, _req: &Request) -> Result<Response> {
    let program = owning_program(server, resource)?;
    if !program.is_running() {
        return Err(Error::Disabled);
    }
    let image = program
        .snapshot
        .clone()
        .ok_or_else(|| Error::not_found(format!("no snapshot of {}", program.name)))?;
    Ok(Response::ok("image/png", image))
}

/// `/{program}-snapshot.jpeg`: multipart still stream
pub fn snapshot_stream(server: &mut Server, resource: &Resource, req: &Request) -> Result<Response> {
    let name = owning_program(server, resource)?.name.clone();
    server.admit(req.client, HandoffTarget::program(name))?;
    Ok(Response::handoff(&format!(
        "multipart/x-mixed-replace; boundary={}",
        STILL_BOUNDARY
    )))
}

/// A raw stream: admit the client, then hand its socket to the sink
pub fn stream(server: &mut Server, resource: &Resource, req: &Request) -> Result<Response> {
    let (program, index) = owning_stream(resource)?;
    let content_type = resource
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());

    server.admit(req.client, HandoffTarget::stream(program, index))?;
    Ok(Response::handoff(&content_type))
}

/// A single-entry playlist pointing at the raw stream
pub fn playlist(server: &mut Server, resource: &Resource, _req: &Request) -> Result<Response> {
    let (program, index) = owning_stream(resource)?;
    let stream = server
        .programs
        .get(program)
        .and_then(|p| p.stream(index))
        .ok_or_else(|| Error::not_found(resource.location.clone()))?;

    let body = format!(
        "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\n{}{}\n",
        server.config.base_url, stream.location
    );
    Ok(Response::ok("application/vnd.apple.mpegurl", body))
}

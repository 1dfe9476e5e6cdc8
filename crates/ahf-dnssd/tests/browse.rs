//! End-to-end browse against a scripted DNS server.

use tokio::net::UdpSocket;

use ahf_common::ServiceInstance;
use ahf_dns::buffer::Writer;
use ahf_dns::{Flags, Message, RecordType, ResolverConfig, ResolverSocket, ResourceRecord};
use ahf_dnssd::ServiceBrowser;

fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    let mut w = Writer::new(&mut buf);
    msg.write(&mut w).unwrap();
    w.buffer().to_vec()
}

/// Answers PTR/SRV/TXT queries for one scripted `_coap._udp` instance.
async fn spawn_scripted_server() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((len, src)) = socket.recv_from(&mut buf).await else { return };
            let Ok(query) = Message::read(&buf[..len]) else { continue };
            let Some(q) = query.question.first() else { continue };

            let mut response = Message {
                id: query.id,
                flags: Flags { qr: true, rd: query.flags.rd, ..Flags::default() },
                question: query.question.clone(),
                ..Message::default()
            };
            match q.rtype {
                RecordType::PTR => response.answer.push(ResourceRecord::ptr(
                    &q.name,
                    "temp-1._coap._udp.arrowhead.org.",
                    120,
                )),
                RecordType::SRV => response.answer.push(ResourceRecord::srv(
                    &q.name,
                    0,
                    5,
                    5683,
                    "gw.arrowhead.org.",
                    120,
                )),
                RecordType::TXT => response.answer.push(ResourceRecord::txt(
                    &q.name,
                    vec!["path=/temp".to_string(), "v=1".to_string()],
                    120,
                )),
                _ => {}
            }
            let _ = socket.send_to(&encode(&response), src).await;
        }
    });
    port
}

#[tokio::test]
async fn test_browse_resolves_scripted_instance() {
    let port = spawn_scripted_server().await;
    let config = ResolverConfig {
        address: "127.0.0.1".into(),
        port,
        keep_open_ms: 3000,
        timeout_ms: 2000,
    };
    let socket = ResolverSocket::new(config).unwrap();
    let browser = ServiceBrowser::new(socket, "arrowhead.org");

    let instances = browser.browse("_coap._udp").await.unwrap();
    assert_eq!(
        instances,
        vec![ServiceInstance {
            name: "temp-1".into(),
            service_type: "_coap._udp".into(),
            domain: "arrowhead.org.".into(),
            host: "gw.arrowhead.org.".into(),
            port: 5683,
            priority: 0,
            weight: 5,
            attributes: vec![("path".into(), "/temp".into()), ("v".into(), "1".into())],
        }]
    );
}

//! Scripted MQTT 3.1.1 broker for exercising sessions over a real socket.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub(crate) const CONNECT: u8 = 1;
pub(crate) const SUBSCRIBE: u8 = 8;
pub(crate) const PINGREQ: u8 = 12;
pub(crate) const DISCONNECT: u8 = 14;

/// One action of the broker, run in order on the first accepted connection.
pub(crate) enum Step {
    /// Reads packets until one of this type arrives. PINGREQ is answered.
    Expect(u8),
    /// Writes raw bytes.
    Send(Vec<u8>),
    /// Answers the last SUBSCRIBE with this return code.
    SubAck(u8),
    /// Closes the connection.
    Close,
}

pub(crate) fn connack(code: u8) -> Vec<u8> {
    vec![0x20, 0x02, 0x00, code]
}

/// QoS 0 PUBLISH, so the client owes no acknowledgement.
pub(crate) fn publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    body.extend_from_slice(topic.as_bytes());
    body.extend_from_slice(payload);

    let mut packet = vec![0x30];
    let mut len = body.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        packet.push(byte);
        if len == 0 {
            break;
        }
    }
    packet.extend_from_slice(&body);
    packet
}

/// Accepts one client and plays the script. Once the script is done the
/// broker keeps reading until the client goes away, recording packet types.
pub(crate) struct BrokerStub {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl BrokerStub {
    pub(crate) async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));

        let task_received = received.clone();
        let task = tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut last_body = Vec::new();

            for step in script {
                match step {
                    Step::Expect(wanted) => loop {
                        let (kind, body) = read_packet(&mut stream).await.unwrap();
                        task_received.lock().unwrap().push(kind);
                        if kind == PINGREQ {
                            stream.write_all(&[0xd0, 0x00]).await.unwrap();
                            continue;
                        }
                        assert_eq!(kind, wanted, "unexpected packet type");
                        last_body = body;
                        break;
                    },
                    Step::Send(bytes) => stream.write_all(&bytes).await.unwrap(),
                    Step::SubAck(code) => {
                        let packet = [0x90, 0x03, last_body[0], last_body[1], code];
                        stream.write_all(&packet).await.unwrap();
                    }
                    Step::Close => {
                        let _ = stream.shutdown().await;
                        return;
                    }
                }
            }

            while let Ok((kind, _)) = read_packet(&mut stream).await {
                task_received.lock().unwrap().push(kind);
            }
        });

        Self {
            addr,
            received,
            task,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Types of the packets read so far.
    pub(crate) fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    /// Waits for the script to complete or the client to disconnect.
    pub(crate) async fn finished(&mut self) {
        (&mut self.task).await.unwrap();
    }
}

impl Drop for BrokerStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Reads one packet, returning its type and variable part.
async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;

    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok((header >> 4, body))
}

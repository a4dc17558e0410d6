use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use netstore_proto::Error;

/// An ephemeral, non-blocking UDP socket the client sends requests from and
/// receives direct replies on (§6: "clients send requests to (MCAST_ADDR,
/// CMD_PORT)... direct UDP replies use the requester's source address").
pub fn bind_client() -> netstore_proto::Result<UdpSocket> {
	let socket = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))
		.map_err(|e| Error::socket_io("create UDP socket", e))?;

	let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
	socket.bind(&bind_addr.into()).map_err(|e| Error::socket_io(format!("bind {bind_addr}"), e))?;
	socket.set_nonblocking(true).map_err(|e| Error::socket_io("set nonblocking", e))?;

	Ok(socket.into())
}

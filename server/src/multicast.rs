use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use netstore_proto::Error;

/// Binds to `INADDR_ANY:cmd_port` and joins `mcast_addr` on all interfaces,
/// per §6: "servers bind to (INADDR_ANY, CMD_PORT) and join the group on
/// all interfaces".
pub fn bind_server(mcast_addr: Ipv4Addr, cmd_port: u16) -> netstore_proto::Result<UdpSocket> {
	let domain = socket2::Domain::IPV4;
	let socket = socket2::Socket::new(domain, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))
		.map_err(|e| Error::socket_io("create UDP socket", e))?;

	socket.set_reuse_address(true).map_err(|e| Error::socket_io("SO_REUSEADDR", e))?;

	let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, cmd_port);
	socket.bind(&bind_addr.into()).map_err(|e| Error::socket_io(format!("bind {bind_addr}"), e))?;

	socket
		.join_multicast_v4(&mcast_addr, &Ipv4Addr::UNSPECIFIED)
		.map_err(|e| Error::socket_io(format!("join multicast group {mcast_addr}"), e))?;

	socket.set_nonblocking(true).map_err(|e| Error::socket_io("set nonblocking", e))?;

	Ok(socket.into())
}

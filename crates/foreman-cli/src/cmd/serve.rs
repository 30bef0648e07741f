use crate::session::Session;

pub fn run(session: Session, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        println!(
            "foreman API on http://localhost:{} (data: {})",
            listener.local_addr()?.port(),
            session.data_dir.display()
        );
        foreman_server::serve_on(session.data_dir, listener, open_browser).await
    })
}

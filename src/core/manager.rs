/// Creates and closes the connections a [`ConnectionPool`](super::ConnectionPool) hands out.
///
/// The pool never inspects a connection; everything it knows about the
/// backing store goes through this trait.
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    fn connect(&self) -> Result<Self::Connection, Self::Error>;

    fn close(&self, conn: Self::Connection) -> Result<(), Self::Error> {
        drop(conn);
        Ok(())
    }

    /// Shown in log lines, e.g. the database path.
    fn descriptor(&self) -> String;
}

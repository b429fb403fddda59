use nodetask::command::Error;


#[tokio::main]
async fn main() -> Result<(), Error> {
    nodetask::command::run().await
}

pub mod convert;
pub mod crawler_service;

pub use crawler_service::CrawlerGrpcService;

// Include generated proto code
pub mod proto {
    tonic::include_proto!("pipeline.crawler.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("crawler_descriptor");
}

//! Contract ABI surface consumed by the gateway

use alloy_sol_types::sol;

sol! {
    /// Gallery NFT: ERC-721 Enumerable with creator attribution and soulbound tokens
    #[derive(Debug)]
    interface IGalleryNft {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function name() external view returns (string memory);
        function totalSupply() external view returns (uint256);
        function tokenByIndex(uint256 index) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
        function tokenURI(uint256 tokenId) external view returns (string memory);
        function supportsInterface(bytes4 interfaceId) external view returns (bool);

        function getCreatorTokens(address creator) external view returns (uint256[] memory);
        function getCreatorName(address creator) external view returns (string memory);
        function getCreators() external view returns (address[] memory);
        function getTokenCreator(uint256 tokenId) external view returns (address);
        function isSoulbound(uint256 tokenId) external view returns (bool);

        function mint(address to, string calldata uri, bool soulbound) external returns (uint256);
        function burn(uint256 tokenId) external;
        function safeTransferFrom(address from, address to, uint256 tokenId) external;
    }

    /// ERC-6551 registry
    #[derive(Debug)]
    interface IERC6551Registry {
        function createAccount(
            address implementation,
            bytes32 salt,
            uint256 chainId,
            address tokenContract,
            uint256 tokenId
        ) external returns (address account);

        function account(
            address implementation,
            bytes32 salt,
            uint256 chainId,
            address tokenContract,
            uint256 tokenId
        ) external view returns (address account);
    }

    /// ERC-6551 account
    #[derive(Debug)]
    interface IERC6551Account {
        function token() external view returns (uint256 chainId, address tokenContract, uint256 tokenId);
        function owner() external view returns (address);
        function state() external view returns (uint256);
        function execute(address to, uint256 value, bytes calldata data, uint8 operation)
            external
            payable
            returns (bytes memory result);
    }
}
